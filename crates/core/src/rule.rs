// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Alerting rule variants. Cooldown bookkeeping lives in the rule engine,
//! not here — a `Rule` only knows how to evaluate a sample tail.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    fn holds(self, current: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => current > threshold,
            Self::Gte => current >= threshold,
            Self::Lt => current < threshold,
            Self::Lte => current <= threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Decrease,
    Increase,
}

/// A threshold or stall alerting rule.
///
/// Tagged variant rather than a base class, per the supervisor's design
/// notes: the rule hierarchy doesn't need dynamic dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    Threshold {
        metric: String,
        threshold: f64,
        comparison: Comparison,
        cooldown_secs: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Stall {
        metric: String,
        window: usize,
        min_delta: f64,
        direction: Direction,
        cooldown_secs: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// Outcome of evaluating a rule against a metric tail: whether it fired, and
/// at what "current" value (the value that should land in the raised Alert).
pub struct Evaluation {
    pub fired: bool,
    pub current: f64,
    pub threshold: f64,
}

impl Rule {
    pub fn metric(&self) -> &str {
        match self {
            Self::Threshold { metric, .. } => metric,
            Self::Stall { metric, .. } => metric,
        }
    }

    pub fn cooldown_secs(&self) -> f64 {
        match self {
            Self::Threshold { cooldown_secs, .. } => *cooldown_secs,
            Self::Stall { cooldown_secs, .. } => *cooldown_secs,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Threshold { message, .. } => message.as_deref(),
            Self::Stall { message, .. } => message.as_deref(),
        }
    }

    pub fn default_message(&self) -> String {
        match self {
            Self::Threshold { metric, threshold, comparison, .. } => {
                format!("{metric} crossed threshold {threshold:?} ({comparison:?})")
            }
            Self::Stall { metric, window, .. } => {
                format!("{metric} stalled over last {window} samples")
            }
        }
    }

    /// Evaluate this rule against the full ordered sample tail for its
    /// metric. `values` must already be filtered to this rule's metric.
    pub fn evaluate(&self, values: &[f64]) -> Evaluation {
        match self {
            Self::Threshold { threshold, comparison, .. } => {
                let current = values.last().copied().unwrap_or(0.0);
                Evaluation {
                    fired: comparison.holds(current, *threshold),
                    current,
                    threshold: *threshold,
                }
            }
            Self::Stall { window, min_delta, direction, .. } => {
                if values.len() < *window {
                    return Evaluation { fired: false, current: values.last().copied().unwrap_or(0.0), threshold: *min_delta };
                }
                let start = values[values.len() - *window];
                let end = *values.last().expect("checked window <= len above");
                let delta = match direction {
                    Direction::Decrease => start - end,
                    Direction::Increase => end - start,
                };
                Evaluation {
                    fired: delta < *min_delta,
                    current: end,
                    threshold: *min_delta,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        gt_below = { Comparison::Gt, 2.0, 2.0, false },
        gt_above = { Comparison::Gt, 2.1, 2.0, true },
        gte_equal_fires = { Comparison::Gte, 2.0, 2.0, true },
        lt_below_fires = { Comparison::Lt, 1.9, 2.0, true },
        lte_equal_fires = { Comparison::Lte, 2.0, 2.0, true },
    )]
    fn comparison_boundaries(cmp: Comparison, current: f64, threshold: f64, expected: bool) {
        assert_eq!(cmp.holds(current, threshold), expected);
    }

    #[test]
    fn stall_never_fires_before_window_samples_exist() {
        let rule = Rule::Stall {
            metric: "loss".into(),
            window: 5,
            min_delta: 0.1,
            direction: Direction::Decrease,
            cooldown_secs: 60.0,
            message: None,
        };
        let eval = rule.evaluate(&[2.5, 2.49, 2.48]);
        assert!(!eval.fired);
    }

    #[test]
    fn stall_fires_on_small_decrease() {
        let rule = Rule::Stall {
            metric: "loss".into(),
            window: 5,
            min_delta: 0.1,
            direction: Direction::Decrease,
            cooldown_secs: 60.0,
            message: None,
        };
        let eval = rule.evaluate(&[2.5, 2.49, 2.48, 2.47, 2.46]);
        assert!(eval.fired);
        assert_eq!(eval.current, 2.46);
    }

    #[test]
    fn stall_increase_direction_uses_end_minus_start() {
        let rule = Rule::Stall {
            metric: "acc".into(),
            window: 3,
            min_delta: 0.05,
            direction: Direction::Increase,
            cooldown_secs: 0.0,
            message: None,
        };
        let eval = rule.evaluate(&[0.50, 0.51, 0.52]);
        assert!(eval.fired);
    }

    #[test]
    fn threshold_evaluation_reports_current_and_threshold() {
        let rule = Rule::Threshold {
            metric: "loss".into(),
            threshold: 2.0,
            comparison: Comparison::Gt,
            cooldown_secs: 60.0,
            message: None,
        };
        let eval = rule.evaluate(&[1.0, 2.5]);
        assert!(eval.fired);
        assert_eq!(eval.current, 2.5);
        assert_eq!(eval.threshold, 2.0);
    }
}

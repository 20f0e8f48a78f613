// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registration-ordered rule evaluation with per-metric cooldowns.

use std::collections::HashMap;

use crate::alert::Alert;
use crate::metric::MetricStore;
use crate::rule::Rule;

/// Evaluates a fixed list of rules against a [`MetricStore`], honouring
/// per-metric cooldowns. Cooldown state is keyed by metric name, not by
/// rule identity, so two rules sharing a metric share one cooldown slot.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<Rule>,
    last_triggered: HashMap<String, f64>,
}

impl RuleEngine {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            last_triggered: HashMap::new(),
        }
    }

    /// Parse a rule list from an environment-supplied JSON string.
    ///
    /// Malformed JSON or a non-list top level yields an empty rule set.
    /// Individual malformed items (including ones missing `metric`) are
    /// skipped rather than aborting the whole load.
    pub fn from_json(raw: &str) -> Self {
        let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(raw) else {
            return Self::default();
        };
        let rules = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<Rule>(item).ok())
            .collect();
        Self::new(rules)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate rules in registration order against `metrics`, optionally
    /// restricted to a single metric name. Returns at most one alert: the
    /// first eligible rule that fires.
    pub fn evaluate(
        &mut self,
        metrics: &MetricStore,
        metric_filter: Option<&str>,
        now: f64,
    ) -> Option<Alert> {
        for idx in 0..self.rules.len() {
            let rule = &self.rules[idx];
            if let Some(filter) = metric_filter {
                if rule.metric() != filter {
                    continue;
                }
            }
            let metric = rule.metric().to_string();
            if let Some(&last) = self.last_triggered.get(&metric) {
                if now - last < rule.cooldown_secs() {
                    continue;
                }
            }
            let Some(series) = metrics.series(&metric) else {
                continue;
            };
            if series.is_empty() {
                continue;
            }
            let values = series.tail(series.len());
            let eval = rule.evaluate(values);
            if eval.fired {
                self.last_triggered.insert(metric.clone(), now);
                let message = rule.message().map(str::to_string).unwrap_or_else(|| rule.default_message());
                return Some(Alert::new(metric, eval.threshold, eval.current, message, now));
            }
        }
        None
    }
}

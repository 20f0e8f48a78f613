// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Alerts raised by the rule engine against a metric tail.

use serde::{Deserialize, Serialize};

/// An immutable record of a fired rule.
///
/// Once appended to `RunState.alerts` an `Alert` is never mutated; a fresh
/// rule firing appends a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub metric: String,
    pub threshold: f64,
    pub current: f64,
    pub message: String,
    pub timestamp: f64,
}

impl Alert {
    pub fn new(
        metric: impl Into<String>,
        threshold: f64,
        current: f64,
        message: impl Into<String>,
        timestamp: f64,
    ) -> Self {
        Self {
            metric: metric.into(),
            threshold,
            current,
            message: message.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_carries_current_at_fire_time() {
        let alert = Alert::new("loss", 2.0, 2.5, "loss above threshold", 100.0);
        assert_eq!(alert.current, 2.5);
        assert_eq!(alert.metric, "loss");
    }
}

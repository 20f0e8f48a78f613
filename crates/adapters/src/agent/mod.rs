// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The diagnosing-agent boundary: an opaque oracle that turns a context and
//! a question (plus an optional alert) into a structured `Plan`. The
//! oracle's own reasoning is out of scope; this module only defines the
//! call/response contract and the defensive fallback.

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeAgent;

mod process;
pub use process::{ProcessAgent, ProcessAgentConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sv_core::Alert;

/// What the agent recommends doing with its diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentAction {
    Explain,
    Refactor,
}

/// The agent's structured verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub diagnosis: String,
    pub action: AgentAction,
    pub code_changes: String,
    pub raw_output: String,
}

impl Plan {
    /// Build the defensive fallback plan used when the oracle itself
    /// raises: `action=explain` carrying the failure classname + message.
    pub fn fallback(error_class: &str, message: &str) -> Self {
        Self {
            diagnosis: format!("{error_class}: {message}"),
            action: AgentAction::Explain,
            code_changes: String::new(),
            raw_output: String::new(),
        }
    }
}

/// The opaque diagnosing-agent call/response boundary.
#[async_trait]
pub trait DiagnosingAgent: Send + Sync + 'static {
    async fn respond(&self, context: &str, question: &str, alert: Option<&Alert>) -> Plan;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_plan_always_explains() {
        let plan = Plan::fallback("ConnectionError", "upstream reset");
        assert_eq!(plan.action, AgentAction::Explain);
        assert_eq!(plan.diagnosis, "ConnectionError: upstream reset");
        assert!(plan.code_changes.is_empty());
    }
}

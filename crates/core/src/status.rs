// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime/rollout status enums shared by the supervisor and ingestion layer.

use serde::{Deserialize, Serialize};

/// Lifecycle status of the currently owned [adapter](crate) instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    Idle,
    Starting,
    Running,
    Recovering,
    Failed,
    Stopped,
    Error,
    Completed,
}

impl RuntimeStatus {
    /// Whether the rollout lease is active in this status.
    pub fn lease_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Recovering)
    }
}

/// Which backend the supervisor should construct on next start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    Local,
    Remote,
    Scaffold,
}

impl Default for RuntimeKind {
    fn default() -> Self {
        Self::Local
    }
}

/// Coarse classification of a runtime failure, used to pick a recovery
/// strategy and to key structured logs/metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Oom,
    Timeout,
    Terminated,
    Quota,
    Auth,
    Api,
    Unknown,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Oom => "oom",
            Self::Timeout => "timeout",
            Self::Terminated => "terminated",
            Self::Quota => "quota",
            Self::Auth => "auth",
            Self::Api => "api",
            Self::Unknown => "unknown",
        }
    }
}

/// Classify a runtime failure by tokenising `status + error_type + message`
/// case-insensitively and returning the first matching class.
///
/// Order matters: an `oom` token always wins even if the message also
/// contains, say, a `timeout` token.
pub fn classify_failure(status: &str, error_type: &str, message: &str) -> FailureClass {
    let haystack = format!("{status} {error_type} {message}").to_lowercase();
    let contains_any = |tokens: &[&str]| tokens.iter().any(|t| haystack.contains(t));

    if contains_any(&["oom", "out of memory", "cuda out of memory", "memoryerror", "killed"]) {
        FailureClass::Oom
    } else if contains_any(&["timeout", "timed out", "deadline exceeded", "heartbeat stale"]) {
        FailureClass::Timeout
    } else if contains_any(&["terminated", "stopped", "not running", "not found", "deleted", "gone"]) {
        FailureClass::Terminated
    } else if contains_any(&["insufficient balance", "insufficient quota", "insufficient_funds", "quota"]) {
        FailureClass::Quota
    } else if contains_any(&["unauthorized", "forbidden", "invalid api key", "authentication", "401", "403"]) {
        FailureClass::Auth
    } else if contains_any(&["apierror", "http", "rate limit", "429", "gateway", "dns", "connection"]) {
        FailureClass::Api
    } else {
        FailureClass::Unknown
    }
}

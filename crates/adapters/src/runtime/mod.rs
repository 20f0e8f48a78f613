// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime adapters: the polymorphic backend that launches and streams one
//! training workload. The three capability-equivalent variants (`Local`,
//! `Remote`, `Scaffold`) share the same trait rather than an inheritance
//! hierarchy; `Scaffold` shares `Local`'s process-spawning code by
//! composition.

mod local;
mod oom_patterns;
mod remote;
mod scaffold;

pub use local::{LocalAdapter, LocalAdapterConfig};
pub use oom_patterns::buffer_matches_oom_pattern;
pub use remote::{trim_overlap, RemoteAdapter, RemoteAdapterConfig};
pub use scaffold::ScaffoldAdapter;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRuntimeAdapter, FakeRuntimeCall};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors starting/stopping a runtime adapter. Distinct from
/// [`RuntimeFailure`], which models a failure of the *workload itself*
/// reported after a successful start.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to spawn workload: {0}")]
    SpawnFailed(String),
    #[error("authentication unavailable: {0}")]
    AuthUnavailable(String),
    #[error("remote sandbox did not become ready: {0}")]
    NotReady(String),
}

/// Successful outcome of `RuntimeAdapter::start`.
#[derive(Debug, Clone)]
pub struct RuntimeStartResult {
    pub runtime_id: String,
}

/// A structured runtime failure, routed through the supervisor's
/// `onFailure` callback. Modelled as a tagged value, not an exception, per
/// the agent-boundary design notes.
#[derive(Debug, Clone)]
pub struct RuntimeFailure {
    pub status: String,
    pub error_type: String,
    pub message: String,
    pub exit_code: Option<i32>,
}

/// Callbacks injected into a `RuntimeAdapter` at construction. The
/// supervisor implements this trait so the adapter never needs to know
/// about `RunState` directly.
#[async_trait]
pub trait RuntimeCallbacks: Send + Sync + 'static {
    async fn on_log(&self, line: &str);
    async fn on_heartbeat(&self);
    async fn on_failure(&self, failure: RuntimeFailure);
    async fn on_complete(&self, status: &str);
}

/// The capability set every backend variant exposes: start, stop, close.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync + 'static {
    async fn start(&self) -> Result<RuntimeStartResult, RuntimeError>;

    /// Idempotent: may be called from inside the adapter's own failure
    /// callback stack (e.g. a watchdog-triggered stop racing a child exit).
    async fn stop(&self);

    async fn close(&self);
}

pub type SharedCallbacks = Arc<dyn RuntimeCallbacks>;

/// Merge the process environment with caller overrides the way the local
/// adapter does: `socket_path`, `run_dir`, `telemetry_on=1`, plus whatever
/// the caller supplies, which wins on key collision.
pub fn build_child_env(
    socket_path: &str,
    run_dir: &str,
    overrides: &[(String, String)],
) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = std::env::vars().collect();
    env.push(("socket_path".to_string(), socket_path.to_string()));
    env.push(("run_dir".to_string(), run_dir.to_string()));
    env.push(("telemetry_on".to_string(), "1".to_string()));
    for (key, value) in overrides {
        env.retain(|(k, _)| k != key);
        env.push((key.clone(), value.clone()));
    }
    env
}

/// Resolve the launch command: an explicit command string tokenised by
/// shell-quoting rules, or `<interpreter> <training_file>`.
pub fn resolve_command(explicit: Option<&str>, interpreter: &str, training_file: &str) -> Result<Vec<String>, RuntimeError> {
    match explicit {
        Some(cmd) => shell_words::split(cmd).map_err(|e| RuntimeError::SpawnFailed(format!("invalid training command: {e}"))),
        None => Ok(vec![interpreter.to_string(), training_file.to_string()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_command_tokenises_explicit_command() {
        let cmd = resolve_command(Some("python3 -u train.py --fast"), "python3", "train.py").unwrap();
        assert_eq!(cmd, vec!["python3", "-u", "train.py", "--fast"]);
    }

    #[test]
    fn resolve_command_falls_back_to_interpreter_and_file() {
        let cmd = resolve_command(None, "python3", "train.py").unwrap();
        assert_eq!(cmd, vec!["python3", "train.py"]);
    }

    #[test]
    fn resolve_command_rejects_unbalanced_quoting() {
        let result = resolve_command(Some("python3 \"unterminated"), "python3", "train.py");
        assert!(result.is_err());
    }

    #[test]
    fn build_child_env_overrides_win_on_collision() {
        let env = build_child_env("/tmp/s.sock", "/tmp/run", &[("BATCH".into(), "16".into())]);
        assert!(env.contains(&("BATCH".to_string(), "16".to_string())));
        assert!(env.contains(&("telemetry_on".to_string(), "1".to_string())));
    }
}

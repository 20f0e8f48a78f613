// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ties the diagnosing-agent boundary to the patch engine: always snapshot
//! first, apply only when the plan calls for it and auto-mode allows it,
//! restore on any failure of the patch or the immediate restart call.

use std::future::Future;
use std::path::Path;

use sv_adapters::{AgentAction, Plan};
use sv_core::RunState;
use sv_storage::{CheckpointState, CheckpointStore};

use crate::error::PatchOutcomeError;

/// Result returned to the ingestion server's `apply_refactor` handler.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub checkpoint_id: Option<String>,
    pub error: Option<String>,
}

pub struct GuardedExecutor {
    checkpoints: CheckpointStore,
}

impl GuardedExecutor {
    pub fn new(checkpoints: CheckpointStore) -> Self {
        Self { checkpoints }
    }

    fn metrics_to_json(run_state: &RunState) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for name in run_state.metrics.metric_names() {
            if let Some(series) = run_state.metrics.series(name) {
                map.insert(name.to_string(), serde_json::json!(series.tail(series.len())));
            }
        }
        serde_json::Value::Object(map)
    }

    /// Execute `plan` against `target_path`. `restart` is the supervisor's
    /// restart callback; its error variant models only an immediate launch
    /// failure, not a later async workload failure (that goes through the
    /// ordinary recovery loop instead, per the restart-after-patch
    /// semantics).
    pub async fn execute<F, Fut>(
        &self,
        plan: &Plan,
        run_state: &RunState,
        auto_mode: bool,
        target_path: &Path,
        now_epoch_secs: u64,
        restart: F,
    ) -> ExecutionResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), String>>,
    {
        let state = CheckpointState {
            metrics: Self::metrics_to_json(run_state),
            step: run_state.current_step(),
        };
        let checkpoint_id = match self.checkpoints.snapshot(target_path, &state, now_epoch_secs) {
            Ok(id) => id,
            Err(e) => {
                let err = PatchOutcomeError::Storage(e);
                return ExecutionResult { success: false, checkpoint_id: None, error: Some(err.to_string()) };
            }
        };

        if plan.action != AgentAction::Refactor {
            return ExecutionResult { success: true, checkpoint_id: Some(checkpoint_id), error: None };
        }

        if !auto_mode {
            let err = PatchOutcomeError::AutoModeOff;
            return ExecutionResult { success: false, checkpoint_id: Some(checkpoint_id), error: Some(err.to_string()) };
        }
        if plan.code_changes.trim().is_empty() {
            let err = PatchOutcomeError::NoCodeChanges;
            return ExecutionResult { success: false, checkpoint_id: Some(checkpoint_id), error: Some(err.to_string()) };
        }

        if let Err(e) = sv_patch::apply(target_path, &plan.code_changes) {
            let _ = self.checkpoints.restore(&checkpoint_id, target_path);
            let err = PatchOutcomeError::Patch(e);
            return ExecutionResult { success: false, checkpoint_id: Some(checkpoint_id), error: Some(err.to_string()) };
        }

        match restart().await {
            Ok(()) => ExecutionResult { success: true, checkpoint_id: Some(checkpoint_id), error: None },
            Err(message) => {
                let _ = self.checkpoints.restore(&checkpoint_id, target_path);
                ExecutionResult { success: false, checkpoint_id: Some(checkpoint_id), error: Some(message) }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(action: AgentAction, code_changes: &str) -> Plan {
        Plan {
            diagnosis: "loss rising".to_string(),
            action,
            code_changes: code_changes.to_string(),
            raw_output: String::new(),
        }
    }

    #[tokio::test]
    async fn explain_plan_returns_success_without_applying_anything() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let training_file = tmp_dir.path().join("train.py");
        std::fs::write(&training_file, "LR = 0.008\n").unwrap();
        let executor = GuardedExecutor::new(CheckpointStore::new(tmp_dir.path().join("ckpts")));
        let run_state = RunState::new(training_file.to_string_lossy().to_string(), ".");

        let result = executor
            .execute(&plan(AgentAction::Explain, ""), &run_state, true, &training_file, 1, || async { Ok(()) })
            .await;

        assert!(result.success);
        assert!(result.checkpoint_id.is_some());
    }

    #[tokio::test]
    async fn refactor_with_auto_mode_off_fails_without_applying() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let training_file = tmp_dir.path().join("train.py");
        std::fs::write(&training_file, "LR = 0.008\n").unwrap();
        let executor = GuardedExecutor::new(CheckpointStore::new(tmp_dir.path().join("ckpts")));
        let run_state = RunState::new(training_file.to_string_lossy().to_string(), ".");
        let diff = "--- a/train.py\n+++ b/train.py\n@@ -1,1 +1,1 @@\n-LR = 0.008\n+LR = 0.001\n";

        let result = executor
            .execute(&plan(AgentAction::Refactor, diff), &run_state, false, &training_file, 1, || async { Ok(()) })
            .await;

        assert!(!result.success);
        let contents = std::fs::read_to_string(&training_file).unwrap();
        assert_eq!(contents, "LR = 0.008\n");
    }

    #[tokio::test]
    async fn refactor_happy_path_applies_and_restarts() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let training_file = tmp_dir.path().join("train.py");
        std::fs::write(&training_file, "LR = 0.008\n").unwrap();
        let executor = GuardedExecutor::new(CheckpointStore::new(tmp_dir.path().join("ckpts")));
        let run_state = RunState::new(training_file.to_string_lossy().to_string(), ".");
        let diff = "--- a/train.py\n+++ b/train.py\n@@ -1,1 +1,1 @@\n-LR = 0.008\n+LR = 0.001\n";

        let result = executor
            .execute(&plan(AgentAction::Refactor, diff), &run_state, true, &training_file, 1, || async { Ok(()) })
            .await;

        assert!(result.success);
        let contents = std::fs::read_to_string(&training_file).unwrap();
        assert_eq!(contents, "LR = 0.001\n");
    }

    #[tokio::test]
    async fn restart_failure_rolls_back_to_snapshot() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let training_file = tmp_dir.path().join("train.py");
        std::fs::write(&training_file, "LR = 0.008\n").unwrap();
        let executor = GuardedExecutor::new(CheckpointStore::new(tmp_dir.path().join("ckpts")));
        let run_state = RunState::new(training_file.to_string_lossy().to_string(), ".");
        let diff = "--- a/train.py\n+++ b/train.py\n@@ -1,1 +1,1 @@\n-LR = 0.008\n+LR = 0.001\n";

        let result = executor
            .execute(&plan(AgentAction::Refactor, diff), &run_state, true, &training_file, 1, || async {
                Err("spawn failed".to_string())
            })
            .await;

        assert!(!result.success);
        let contents = std::fs::read_to_string(&training_file).unwrap();
        assert_eq!(contents, "LR = 0.008\n");
    }

    #[tokio::test]
    async fn context_mismatch_rolls_back_and_checkpoint_still_exists() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let training_file = tmp_dir.path().join("train.py");
        std::fs::write(&training_file, "LR = 0.008\n").unwrap();
        let executor = GuardedExecutor::new(CheckpointStore::new(tmp_dir.path().join("ckpts")));
        let run_state = RunState::new(training_file.to_string_lossy().to_string(), ".");
        let diff = "--- a/train.py\n+++ b/train.py\n@@ -1,1 +1,1 @@\n-LR = 0.010\n+LR = 0.001\n";

        let result = executor
            .execute(&plan(AgentAction::Refactor, diff), &run_state, true, &training_file, 1, || async { Ok(()) })
            .await;

        assert!(!result.success);
        assert!(result.checkpoint_id.is_some());
        let contents = std::fs::read_to_string(&training_file).unwrap();
        assert_eq!(contents, "LR = 0.008\n");
    }
}

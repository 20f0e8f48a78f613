// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sv-storage: checkpoint snapshot/restore pairs under a root directory.
//!
//! A checkpoint is a directory `ckpt_<epoch_seconds>` holding a copy of the
//! training file and a `state.json` payload. The directory name is the
//! checkpoint id.

mod error;

pub use error::StorageError;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The `state.json` payload written alongside the training file copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    pub metrics: serde_json::Value,
    pub step: u64,
}

/// Writes and restores checkpoint directories under a fixed root.
///
/// Append-only per checkpoint id: once written, a checkpoint's contents are
/// never mutated, only read back by `restore`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create `root/ckpt_<epoch_secs>`, copy `training_file_path` into it,
    /// and write `state.json`. Returns the checkpoint id (the directory
    /// name).
    pub fn snapshot(
        &self,
        training_file_path: &Path,
        state: &CheckpointState,
        epoch_secs: u64,
    ) -> Result<String, StorageError> {
        let checkpoint_id = format!("ckpt_{epoch_secs}");
        let dir = self.root.join(&checkpoint_id);
        std::fs::create_dir_all(&dir)?;

        let file_name = training_file_path
            .file_name()
            .ok_or_else(|| StorageError::NoFileName(training_file_path.to_path_buf()))?;
        std::fs::copy(training_file_path, dir.join(file_name))?;

        let payload = serde_json::to_vec_pretty(state)?;
        std::fs::write(dir.join("state.json"), payload)?;

        Ok(checkpoint_id)
    }

    /// Copy `root/<checkpoint_id>/<basename of target_path>` back over
    /// `target_path`.
    pub fn restore(&self, checkpoint_id: &str, target_path: &Path) -> Result<(), StorageError> {
        let dir = self.root.join(checkpoint_id);
        if !dir.is_dir() {
            return Err(StorageError::CheckpointNotFound(checkpoint_id.to_string()));
        }
        let file_name = target_path
            .file_name()
            .ok_or_else(|| StorageError::NoFileName(target_path.to_path_buf()))?;
        std::fs::copy(dir.join(file_name), target_path)?;
        Ok(())
    }

    /// Read back a checkpoint's `state.json` payload.
    pub fn load_state(&self, checkpoint_id: &str) -> Result<CheckpointState, StorageError> {
        let path = self.root.join(checkpoint_id).join("state.json");
        if !path.is_file() {
            return Err(StorageError::CheckpointNotFound(checkpoint_id.to_string()));
        }
        let raw = std::fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn snapshot_then_restore_round_trips_bytes() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let training_file = tmp_dir.path().join("train.py");
        std::fs::write(&training_file, "LR = 0.008\n").unwrap();

        let store = CheckpointStore::new(tmp_dir.path().join("checkpoints"));
        let state = CheckpointState {
            metrics: serde_json::json!({"loss": [2.5]}),
            step: 10,
        };
        let id = store.snapshot(&training_file, &state, 1_700_000_000).unwrap();
        assert_eq!(id, "ckpt_1700000000");

        let mut f = std::fs::OpenOptions::new().write(true).truncate(true).open(&training_file).unwrap();
        write!(f, "LR = 0.001\n").unwrap();
        drop(f);

        store.restore(&id, &training_file).unwrap();
        let restored = std::fs::read_to_string(&training_file).unwrap();
        assert_eq!(restored, "LR = 0.008\n");
    }

    #[test]
    fn load_state_returns_recorded_step() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let training_file = tmp_dir.path().join("train.py");
        std::fs::write(&training_file, "x = 1\n").unwrap();
        let store = CheckpointStore::new(tmp_dir.path().join("checkpoints"));
        let state = CheckpointState { metrics: serde_json::json!({}), step: 42 };
        let id = store.snapshot(&training_file, &state, 1).unwrap();

        let loaded = store.load_state(&id).unwrap();
        assert_eq!(loaded.step, 42);
    }

    #[test]
    fn restore_unknown_checkpoint_errors() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp_dir.path());
        let err = store.restore("ckpt_nope", &tmp_dir.path().join("train.py")).unwrap_err();
        assert!(matches!(err, StorageError::CheckpointNotFound(_)));
    }
}

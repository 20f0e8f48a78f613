// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("checkpoint {0:?} not found under storage root")]
    CheckpointNotFound(String),

    #[error("training file has no basename: {0:?}")]
    NoFileName(std::path::PathBuf),

    #[error("checkpoint state payload is invalid: {0}")]
    InvalidStatePayload(#[from] serde_json::Error),

    #[error("checkpoint filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),
}

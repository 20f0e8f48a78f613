// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("no adapter configured for runtime kind {0:?}")]
    NoAdapterConfigured(sv_core::RuntimeKind),
    #[error("runtime adapter failed to start: {0}")]
    StartFailed(#[from] sv_adapters::RuntimeError),
}

/// Outcome of the guarded executor's refactor attempt. Tagged result, not
/// an exception: the only panics in this crate should be invariant
/// violations.
#[derive(Debug, Error)]
pub enum PatchOutcomeError {
    #[error("auto-mode is off")]
    AutoModeOff,
    #[error("no code changes proposed")]
    NoCodeChanges,
    #[error("patch application failed: {0}")]
    Patch(#[from] sv_patch::PatchError),
    #[error("checkpoint operation failed: {0}")]
    Storage(#[from] sv_storage::StorageError),
}

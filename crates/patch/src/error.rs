// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Failure codes surfaced by `PatchEngine::apply`, matching the codes the
/// ingestion server's `apply_refactor` handler echoes back to callers.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("diff contains no hunks")]
    DiffEmpty,

    #[error("diff targets no file matching {target}")]
    DiffNoTarget { target: String },

    #[error("diff targets {count} files, expected exactly one matching {target}")]
    DiffMultipleTargets { target: String, count: usize },

    #[error("hunk at source line {source_start} overlaps the previous hunk")]
    OverlappingHunks { source_start: usize },

    #[error("context mismatch at source line {line}: expected {expected:?}, found {found:?}")]
    ContextMismatch {
        line: usize,
        expected: String,
        found: Option<String>,
    },

    #[error("removal mismatch at source line {line}: expected {expected:?}, found {found:?}")]
    RemovalMismatch {
        line: usize,
        expected: String,
        found: Option<String>,
    },

    #[error("failed to read target file: {0}")]
    Io(#[from] std::io::Error),
}

impl PatchError {
    /// Stable short code, as referenced in spec error tables and the
    /// ingestion server's `apply_refactor` reply.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DiffEmpty => "DIFF_EMPTY",
            Self::DiffNoTarget { .. } => "DIFF_NO_TARGET",
            Self::DiffMultipleTargets { .. } => "DIFF_MULTIPLE_TARGETS",
            Self::OverlappingHunks { .. } => "OVERLAPPING_HUNKS",
            Self::ContextMismatch { .. } => "CONTEXT_MISMATCH",
            Self::RemovalMismatch { .. } => "REMOVAL_MISMATCH",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

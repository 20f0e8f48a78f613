// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sv-patch: parse and apply a minimal unified-diff document against
//! exactly one target file, atomically.
//!
//! Purely functional over bytes — holds no mutable state. Snapshot/restore
//! of checkpoints lives in `sv-storage`; this crate only knows how to turn
//! diff text plus original bytes into patched bytes.

mod apply;
mod error;
mod model;
mod normalize;
mod parse;
mod path;

pub use error::PatchError;
pub use model::{Hunk, HunkLine, PatchedFile};

use std::path::Path;

/// Apply `diff_text` against the file at `target_path`.
///
/// Normalises the diff, parses it, selects the subset of `PatchedFile`s
/// that target `target_path` by path equivalence, and requires exactly
/// one match. Writes atomically via `<target>.tmp` + rename.
pub fn apply(target_path: &Path, diff_text: &str) -> Result<(), PatchError> {
    let normalized = normalize::normalize_diff_text(diff_text);
    let files = parse::parse_patched_files(&normalized);
    if files.is_empty() {
        return Err(PatchError::DiffEmpty);
    }

    let matching: Vec<&PatchedFile> = files
        .iter()
        .filter(|file| path::patch_targets_file(file, target_path))
        .collect();

    match matching.len() {
        0 => Err(PatchError::DiffNoTarget {
            target: target_path.to_string_lossy().to_string(),
        }),
        1 => {
            let original = std::fs::read_to_string(target_path)?;
            let patched = apply::apply_hunks(matching[0], &original)?;
            apply::write_atomic(target_path, &patched)
        }
        count => Err(PatchError::DiffMultipleTargets {
            target: target_path.to_string_lossy().to_string(),
            count,
        }),
    }
}

/// Normalise diff text the same way `apply` does, exposed for callers that
/// want to inspect/log the normalised body (e.g. the chat transcript diff
/// summary) without applying it.
pub fn normalize_diff_text(raw: &str) -> String {
    normalize::normalize_diff_text(raw)
}

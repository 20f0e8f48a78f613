// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Context-strict hunk application: atomic rewrite of exactly one file.

use std::path::Path;

use crate::error::PatchError;
use crate::model::{HunkLine, PatchedFile};

/// Walk `file`'s hunks against `original` (already split into lines with no
/// trailing newline markers) and produce the patched content.
pub fn apply_hunks(file: &PatchedFile, original: &str) -> Result<String, PatchError> {
    let ends_with_newline = original.ends_with('\n');
    let original_lines: Vec<&str> = original.lines().collect();
    let mut output: Vec<String> = Vec::new();
    let mut src_index: usize = 0;

    for hunk in &file.hunks {
        let hunk_start = hunk.source_start.saturating_sub(1);
        if hunk_start < src_index {
            return Err(PatchError::OverlappingHunks {
                source_start: hunk.source_start,
            });
        }
        output.extend(original_lines[src_index..hunk_start.min(original_lines.len())].iter().map(|s| s.to_string()));
        src_index = hunk_start;

        for line in &hunk.lines {
            match line {
                HunkLine::Context(expected) => {
                    let found = original_lines.get(src_index).copied();
                    if found != Some(expected.as_str()) {
                        return Err(PatchError::ContextMismatch {
                            line: src_index + 1,
                            expected: expected.clone(),
                            found: found.map(str::to_string),
                        });
                    }
                    output.push(expected.clone());
                    src_index += 1;
                }
                HunkLine::Removal(expected) => {
                    let found = original_lines.get(src_index).copied();
                    if found != Some(expected.as_str()) {
                        return Err(PatchError::RemovalMismatch {
                            line: src_index + 1,
                            expected: expected.clone(),
                            found: found.map(str::to_string),
                        });
                    }
                    src_index += 1;
                }
                HunkLine::Addition(text) => {
                    output.push(text.clone());
                }
            }
        }
    }

    output.extend(original_lines[src_index..].iter().map(|s| s.to_string()));

    let mut result = output.join("\n");
    if ends_with_newline || result.is_empty() {
        result.push('\n');
    }
    Ok(result)
}

/// Atomically rewrite `target_path` with `new_content`: write to
/// `<target>.tmp` then rename over `target`.
pub fn write_atomic(target_path: &Path, new_content: &str) -> Result<(), PatchError> {
    let tmp_path = target_path.with_extension(
        target_path
            .extension()
            .map(|ext| format!("{}.tmp", ext.to_string_lossy()))
            .unwrap_or_else(|| "tmp".to_string()),
    );
    std::fs::write(&tmp_path, new_content)?;
    std::fs::rename(&tmp_path, target_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Hunk;

    fn patched_file(hunks: Vec<Hunk>) -> PatchedFile {
        PatchedFile {
            old_path: "a/train.py".into(),
            new_path: "b/train.py".into(),
            hunks,
        }
    }

    #[test]
    fn happy_path_single_line_replace() {
        let file = patched_file(vec![Hunk {
            source_start: 1,
            lines: vec![
                HunkLine::Removal("LR = 0.008".into()),
                HunkLine::Addition("LR = 0.001".into()),
            ],
        }]);
        let result = apply_hunks(&file, "LR = 0.008\n").unwrap();
        assert_eq!(result, "LR = 0.001\n");
    }

    #[test]
    fn context_mismatch_is_rejected() {
        let file = patched_file(vec![Hunk {
            source_start: 1,
            lines: vec![
                HunkLine::Removal("LR = 0.010".into()),
                HunkLine::Addition("LR = 0.001".into()),
            ],
        }]);
        let err = apply_hunks(&file, "LR = 0.008\n").unwrap_err();
        assert_eq!(err.code(), "REMOVAL_MISMATCH");
    }

    #[test]
    fn overlapping_hunks_are_rejected() {
        let file = patched_file(vec![
            Hunk { source_start: 3, lines: vec![HunkLine::Context("c".into())] },
            Hunk { source_start: 2, lines: vec![HunkLine::Context("b".into())] },
        ]);
        let err = apply_hunks(&file, "a\nb\nc\n").unwrap_err();
        assert_eq!(err.code(), "OVERLAPPING_HUNKS");
    }

    #[test]
    fn preserves_context_lines_around_hunk() {
        let file = patched_file(vec![Hunk {
            source_start: 2,
            lines: vec![
                HunkLine::Context("b".into()),
                HunkLine::Removal("c".into()),
                HunkLine::Addition("C".into()),
            ],
        }]);
        let result = apply_hunks(&file, "a\nb\nc\nd\n").unwrap();
        assert_eq!(result, "a\nb\nC\nd\n");
    }

    #[test]
    fn reverse_diff_round_trips_to_original() {
        let forward = patched_file(vec![Hunk {
            source_start: 1,
            lines: vec![
                HunkLine::Removal("LR = 0.008".into()),
                HunkLine::Addition("LR = 0.001".into()),
            ],
        }]);
        let patched = apply_hunks(&forward, "LR = 0.008\n").unwrap();

        let reverse = patched_file(vec![Hunk {
            source_start: 1,
            lines: vec![
                HunkLine::Removal("LR = 0.001".into()),
                HunkLine::Addition("LR = 0.008".into()),
            ],
        }]);
        let restored = apply_hunks(&reverse, &patched).unwrap();
        assert_eq!(restored, "LR = 0.008\n");
    }
}

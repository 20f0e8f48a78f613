// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path-equivalence checks between a diff header path and the target path
//! the caller asked us to patch.

use std::path::Path;

use crate::model::PatchedFile;

/// Normalise a diff header path for comparison: strip `a/`/`b/`, `./`,
/// `file://`, convert backslashes to slashes. `/dev/null` never matches.
pub fn normalize_patch_path(raw: &str) -> Option<String> {
    let mut path = raw.trim().replace('\\', "/");

    if path == "/dev/null" {
        return None;
    }

    if let Some(stripped) = path.strip_prefix("file://") {
        path = stripped.to_string();
    }
    if let Some(stripped) = path.strip_prefix("./") {
        path = stripped.to_string();
    }
    if let Some(stripped) = path.strip_prefix("a/").or_else(|| path.strip_prefix("b/")) {
        path = stripped.to_string();
    }

    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

/// Whether `file` targets `target_path`, matching either the old or new
/// header path against `target_path` by exact equivalence or the
/// original's suffix-match rule (the header path is a path suffix of the
/// target's absolute path).
pub fn patch_targets_file(file: &PatchedFile, target_path: &Path) -> bool {
    let target_str = target_path.to_string_lossy().replace('\\', "/");
    let target_norm = normalize_patch_path(&target_str);

    [&file.old_path, &file.new_path].iter().any(|header_path| {
        let Some(normalized) = normalize_patch_path(header_path) else {
            return false;
        };
        if let Some(target_norm) = &target_norm {
            if &normalized == target_norm {
                return true;
            }
        }
        target_str.ends_with(&format!("/{normalized}")) || target_str == normalized
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(old: &str, new: &str) -> PatchedFile {
        PatchedFile {
            old_path: old.into(),
            new_path: new.into(),
            hunks: vec![],
        }
    }

    #[test]
    fn strips_ab_prefixes() {
        assert_eq!(normalize_patch_path("a/train.py"), Some("train.py".into()));
        assert_eq!(normalize_patch_path("b/train.py"), Some("train.py".into()));
    }

    #[test]
    fn dev_null_never_matches() {
        assert_eq!(normalize_patch_path("/dev/null"), None);
    }

    #[test]
    fn exact_relative_match() {
        let f = file("a/train.py", "b/train.py");
        assert!(patch_targets_file(&f, &PathBuf::from("train.py")));
    }

    #[test]
    fn suffix_match_against_absolute_target() {
        let f = file("a/train.py", "b/train.py");
        assert!(patch_targets_file(&f, &PathBuf::from("/home/user/project/train.py")));
    }

    #[test]
    fn unrelated_path_does_not_match() {
        let f = file("a/other.py", "b/other.py");
        assert!(!patch_targets_file(&f, &PathBuf::from("train.py")));
    }
}

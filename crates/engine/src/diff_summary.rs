// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable one-line summary of assignment changes in a diff, shown
//! in the chat transcript after a proposed refactor.

use std::collections::{BTreeSet, HashMap};

const MAX_SHOWN: usize = 5;

fn parse_assignment(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    let eq = trimmed.find('=')?;
    let (name, rest) = trimmed.split_at(eq);
    let name = name.trim();
    if name.is_empty() || !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
        return None;
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let value = rest[1..].trim();
    if value.is_empty() {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}

/// Summarise `KEY = value` assignment changes in a unified diff body into a
/// single line: `Refactor summary: KEY: before -> after | ...`.
///
/// Returns an empty string when the diff contains no recognisable
/// assignment changes.
pub fn summarize(diff_text: &str) -> String {
    let mut removed: HashMap<String, String> = HashMap::new();
    let mut added: HashMap<String, String> = HashMap::new();

    for raw_line in diff_text.lines() {
        if raw_line.starts_with("---") || raw_line.starts_with("+++") || raw_line.starts_with("@@") {
            continue;
        }
        if let Some(rest) = raw_line.strip_prefix('-') {
            if let Some((key, value)) = parse_assignment(rest) {
                removed.insert(key, value);
            }
        } else if let Some(rest) = raw_line.strip_prefix('+') {
            if let Some((key, value)) = parse_assignment(rest) {
                added.insert(key, value);
            }
        }
    }

    let keys: BTreeSet<&String> = removed.keys().chain(added.keys()).collect();
    let mut changes = Vec::new();
    for key in keys {
        let before = removed.get(key);
        let after = added.get(key);
        match (before, after) {
            (Some(before), Some(after)) if before != after => {
                changes.push(format!("{key}: {before} -> {after}"));
            }
            (None, Some(after)) => {
                changes.push(format!("{key}: set to {after}"));
            }
            (Some(_), None) => {
                changes.push(format!("{key}: removed"));
            }
            _ => {}
        }
    }

    if changes.is_empty() {
        return String::new();
    }

    let shown: Vec<&String> = changes.iter().take(MAX_SHOWN).collect();
    let suffix = if changes.len() > shown.len() { " ..." } else { "" };
    let joined = shown.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" | ");
    format!("Refactor summary: {joined}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarizes_changed_assignment() {
        let diff = "--- a/train.py\n+++ b/train.py\n@@ -1,1 +1,1 @@\n-LR = 0.008\n+LR = 0.001\n";
        assert_eq!(summarize(diff), "Refactor summary: LR: 0.008 -> 0.001");
    }

    #[test]
    fn summarizes_new_assignment() {
        let diff = "--- a/train.py\n+++ b/train.py\n@@ -1,0 +1,1 @@\n+WARMUP = 100\n";
        assert_eq!(summarize(diff), "Refactor summary: WARMUP: set to 100");
    }

    #[test]
    fn summarizes_removed_assignment() {
        let diff = "--- a/train.py\n+++ b/train.py\n@@ -1,1 +1,0 @@\n-DEBUG = True\n";
        assert_eq!(summarize(diff), "Refactor summary: DEBUG: removed");
    }

    #[test]
    fn returns_empty_string_when_no_assignments_found() {
        let diff = "--- a/train.py\n+++ b/train.py\n@@ -1,1 +1,1 @@\n-print('hi')\n+print('bye')\n";
        assert_eq!(summarize(diff), "");
    }

    #[test]
    fn truncates_to_five_with_ellipsis_suffix() {
        let mut diff = String::from("--- a/train.py\n+++ b/train.py\n@@ -1,6 +1,6 @@\n");
        for i in 0..6 {
            diff.push_str(&format!("-VAR{i} = 0\n+VAR{i} = 1\n"));
        }
        let summary = summarize(&diff);
        assert!(summary.ends_with(" ..."));
        assert_eq!(summary.matches('|').count(), 4);
    }
}

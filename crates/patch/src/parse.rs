// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Header detection and hunk range parsing. No fuzz or offset heuristics —
//! a malformed header or hunk line is simply not recognised as part of a
//! patch body.

use crate::model::{Hunk, HunkLine, PatchedFile};

/// Parse a normalised diff body into one or more [`PatchedFile`]s.
///
/// Lines that aren't part of a recognised `---`/`+++`/`@@` structure (e.g.
/// a `diff --git` line, an `index` line) are skipped rather than rejected.
pub fn parse_patched_files(diff_text: &str) -> Vec<PatchedFile> {
    let lines: Vec<&str> = diff_text.lines().collect();
    let mut files = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if !lines[i].starts_with("--- ") {
            i += 1;
            continue;
        }
        let old_path = strip_header_path(&lines[i][4..]);
        i += 1;
        if i >= lines.len() || !lines[i].starts_with("+++ ") {
            continue;
        }
        let new_path = strip_header_path(&lines[i][4..]);
        i += 1;

        let mut hunks = Vec::new();
        while i < lines.len() && lines[i].starts_with("@@ ") {
            let Some(source_start) = parse_hunk_source_start(lines[i]) else {
                break;
            };
            i += 1;
            let mut hunk_lines = Vec::new();
            while i < lines.len() {
                let line = lines[i];
                if line.starts_with("@@ ") || line.starts_with("--- ") {
                    break;
                }
                if let Some(rest) = line.strip_prefix(' ') {
                    hunk_lines.push(HunkLine::Context(rest.to_string()));
                } else if let Some(rest) = line.strip_prefix('-') {
                    hunk_lines.push(HunkLine::Removal(rest.to_string()));
                } else if let Some(rest) = line.strip_prefix('+') {
                    hunk_lines.push(HunkLine::Addition(rest.to_string()));
                } else if line.starts_with('\\') {
                    // "\ No newline at end of file" — not tracked.
                } else if line.is_empty() {
                    hunk_lines.push(HunkLine::Context(String::new()));
                } else {
                    break;
                }
                i += 1;
            }
            hunks.push(Hunk { source_start, lines: hunk_lines });
        }

        files.push(PatchedFile { old_path, new_path, hunks });
    }

    files
}

fn strip_header_path(raw: &str) -> String {
    // Header lines may carry a tab-separated timestamp: "a/train.py\t2026-01-01 ...".
    raw.split('\t').next().unwrap_or(raw).trim().to_string()
}

fn parse_hunk_source_start(header: &str) -> Option<usize> {
    // "@@ -start,len +start,len @@" or "@@ -start +start @@"
    let inner = header.strip_prefix("@@ ")?;
    let minus = inner.split_whitespace().find(|tok| tok.starts_with('-'))?;
    let start_str = minus.trim_start_matches('-').split(',').next()?;
    start_str.parse::<usize>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_file_single_hunk() {
        let diff = "--- a/train.py\n+++ b/train.py\n@@ -1,1 +1,1 @@\n-LR = 0.008\n+LR = 0.001\n";
        let files = parse_patched_files(diff);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].old_path, "a/train.py");
        assert_eq!(files[0].hunks.len(), 1);
        assert_eq!(files[0].hunks[0].source_start, 1);
        assert_eq!(
            files[0].hunks[0].lines,
            vec![
                HunkLine::Removal("LR = 0.008".into()),
                HunkLine::Addition("LR = 0.001".into()),
            ]
        );
    }

    #[test]
    fn empty_text_yields_no_files() {
        assert!(parse_patched_files("").is_empty());
    }

    #[test]
    fn strips_tab_separated_timestamp_from_header() {
        let diff = "--- a/train.py\t2026-01-01 00:00:00\n+++ b/train.py\t2026-01-01 00:00:01\n@@ -1,1 +1,1 @@\n-a\n+b\n";
        let files = parse_patched_files(diff);
        assert_eq!(files[0].old_path, "a/train.py");
        assert_eq!(files[0].new_path, "b/train.py");
    }

    #[test]
    fn parses_multiple_hunks_in_one_file() {
        let diff = "--- a/x\n+++ b/x\n@@ -1,1 +1,1 @@\n-a\n+b\n@@ -5,1 +5,1 @@\n-c\n+d\n";
        let files = parse_patched_files(diff);
        assert_eq!(files[0].hunks.len(), 2);
        assert_eq!(files[0].hunks[1].source_start, 5);
    }
}

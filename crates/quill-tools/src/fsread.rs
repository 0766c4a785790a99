// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Bounded file reading shared by the read_file tool and the `@path`
//! prompt-injection expander.  Both surfaces advertise identical limits and
//! metadata strings so the model sees consistent truncation behavior.

use std::path::Path;

/// Hard per-file ceiling.  Larger files are skipped entirely.
pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
/// Maximum lines returned in one read.
pub const MAX_LINES: usize = 2000;
/// Per-line character ceiling; longer lines are cut with a suffix.
pub const MAX_LINE_CHARS: usize = 2000;

const TRUNCATION_SUFFIX: &str = "... [truncated]";

/// A bounded view of a file: the content plus a human-readable note about
/// what was left out, when anything was.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSlice {
    pub content: String,
    pub metadata: Option<String>,
}

/// An inclusive 1-indexed line range, as written in `@path:START-END`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn single(line: usize) -> Self {
        Self {
            start: line,
            end: line,
        }
    }

    fn valid(&self) -> bool {
        self.start >= 1 && self.end >= self.start
    }
}

/// Read `path` under the shared limits.
///
/// Oversized files are skipped with a size note; out-of-bounds or inverted
/// ranges yield empty content with an `Invalid line range` note; long files
/// and long lines are truncated with explanatory metadata.
pub fn read_file_slice(path: &Path, range: Option<LineRange>) -> std::io::Result<FileSlice> {
    let size = std::fs::metadata(path)?.len();
    if size > MAX_FILE_BYTES {
        let mb = size / (1024 * 1024);
        return Ok(FileSlice {
            content: String::new(),
            metadata: Some(format!("File size: {mb}MB (skipped)")),
        });
    }

    let text = std::fs::read_to_string(path)?;
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();

    let (selected, metadata) = match range {
        Some(range) if !range.valid() || range.start > total.max(1) => {
            return Ok(FileSlice {
                content: String::new(),
                metadata: Some("Invalid line range".to_string()),
            });
        }
        Some(range) => {
            let start = range.start;
            let end = range.end.min(total);
            let slice = &lines[start - 1..end];
            (
                slice.to_vec(),
                Some(format!("Lines {start}-{end} of {total} total lines")),
            )
        }
        None if total > MAX_LINES => (
            lines[..MAX_LINES].to_vec(),
            Some(format!(
                "Showing first {MAX_LINES} lines of {total} total lines"
            )),
        ),
        None => (lines, None),
    };

    let content = selected
        .iter()
        .map(|line| truncate_line(line))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(FileSlice { content, metadata })
}

fn truncate_line(line: &str) -> String {
    if line.chars().count() <= MAX_LINE_CHARS {
        return line.to_string();
    }
    let cut: String = line.chars().take(MAX_LINE_CHARS).collect();
    format!("{cut}{TRUNCATION_SUFFIX}")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_lines(dir: &tempfile::TempDir, name: &str, n: usize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for i in 1..=n {
            writeln!(f, "L{i}").unwrap();
        }
        path
    }

    #[test]
    fn small_file_reads_fully_without_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(&dir, "f.txt", 3);
        let slice = read_file_slice(&path, None).unwrap();
        assert_eq!(slice.content, "L1\nL2\nL3");
        assert!(slice.metadata.is_none());
    }

    #[test]
    fn range_selects_inclusive_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(&dir, "f.txt", 10);
        let slice = read_file_slice(&path, Some(LineRange { start: 1, end: 5 })).unwrap();
        assert_eq!(slice.content, "L1\nL2\nL3\nL4\nL5");
        assert_eq!(
            slice.metadata.as_deref(),
            Some("Lines 1-5 of 10 total lines")
        );
    }

    #[test]
    fn range_end_is_clamped_to_total() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(&dir, "f.txt", 4);
        let slice = read_file_slice(&path, Some(LineRange { start: 3, end: 99 })).unwrap();
        assert_eq!(slice.content, "L3\nL4");
        assert_eq!(slice.metadata.as_deref(), Some("Lines 3-4 of 4 total lines"));
    }

    #[test]
    fn zero_start_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(&dir, "f.txt", 4);
        let slice = read_file_slice(&path, Some(LineRange { start: 0, end: 2 })).unwrap();
        assert_eq!(slice.content, "");
        assert_eq!(slice.metadata.as_deref(), Some("Invalid line range"));
    }

    #[test]
    fn inverted_range_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(&dir, "f.txt", 4);
        let slice = read_file_slice(&path, Some(LineRange { start: 3, end: 2 })).unwrap();
        assert_eq!(slice.metadata.as_deref(), Some("Invalid line range"));
    }

    #[test]
    fn start_beyond_eof_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(&dir, "f.txt", 4);
        let slice = read_file_slice(&path, Some(LineRange { start: 10, end: 12 })).unwrap();
        assert_eq!(slice.metadata.as_deref(), Some("Invalid line range"));
    }

    #[test]
    fn long_file_is_cut_at_line_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(&dir, "f.txt", 2500);
        let slice = read_file_slice(&path, None).unwrap();
        assert_eq!(slice.content.lines().count(), MAX_LINES);
        assert_eq!(
            slice.metadata.as_deref(),
            Some("Showing first 2000 lines of 2500 total lines")
        );
    }

    #[test]
    fn long_lines_get_truncation_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.txt");
        std::fs::write(&path, "x".repeat(3000)).unwrap();
        let slice = read_file_slice(&path, None).unwrap();
        assert!(slice.content.ends_with(TRUNCATION_SUFFIX));
        assert_eq!(
            slice.content.chars().count(),
            MAX_LINE_CHARS + TRUNCATION_SUFFIX.chars().count()
        );
    }

    #[test]
    fn oversized_file_is_skipped_with_size_note() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let f = std::fs::File::create(&path).unwrap();
        f.set_len(MAX_FILE_BYTES + 1024 * 1024).unwrap();
        let slice = read_file_slice(&path, None).unwrap();
        assert_eq!(slice.content, "");
        assert_eq!(slice.metadata.as_deref(), Some("File size: 11MB (skipped)"));
    }
}

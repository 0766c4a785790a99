// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `@path` prompt injection.
//!
//! The user may write `@path` or `@"path with spaces"`, optionally followed
//! by `:LINE` or `:START-END`.  Each unique (path, range) pair expands into
//! a `<file>` entry; directories become `<directory_structure>` trees with
//! contents not inlined.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use walkdir::WalkDir;

use quill_tools::fsread::{read_file_slice, FileSlice, LineRange};

const TREE_MAX_DEPTH: usize = 3;
const TREE_MAX_ENTRIES: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtPathRef {
    pub path: String,
    pub range: Option<LineRange>,
}

/// Extract the unique `@path` references, in first-appearance order.
///
/// Idempotent over its own output: expanding a prompt does not introduce
/// new references, so a second pass extracts the same set.
pub fn extract_at_paths(prompt: &str) -> Vec<AtPathRef> {
    let re = Regex::new(
        r#"@(?:"(?P<quoted>[^"]+)"|(?P<bare>[A-Za-z0-9_~][A-Za-z0-9_\-./~]*))(?::(?P<start>\d+)(?:-(?P<end>\d+))?)?"#,
    )
    .unwrap_or_else(|e| unreachable!("static regex: {e}"));

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for caps in re.captures_iter(prompt) {
        let raw = caps
            .name("quoted")
            .or_else(|| caps.name("bare"))
            .map(|m| m.as_str())
            .unwrap_or_default();
        // A bare path can swallow sentence punctuation: "see @README.md."
        let path = raw.trim_end_matches('.').to_string();
        if path.is_empty() {
            continue;
        }
        let range = match (caps.name("start"), caps.name("end")) {
            (Some(start), Some(end)) => {
                let s = start.as_str().parse().unwrap_or(0);
                let e = end.as_str().parse().unwrap_or(0);
                Some(LineRange { start: s, end: e })
            }
            (Some(start), None) => {
                let line = start.as_str().parse().unwrap_or(0);
                Some(LineRange::single(line))
            }
            _ => None,
        };
        let reference = AtPathRef { path, range };
        if seen.insert(reference.clone()) {
            out.push(reference);
        }
    }
    out
}

/// Render the context blocks for the extracted references, or `None` when
/// the prompt mentions no paths that exist.
pub fn expand_prompt_context(cwd: &Path, prompt: &str) -> Option<String> {
    let refs = extract_at_paths(prompt);
    if refs.is_empty() {
        return None;
    }

    let mut files = String::new();
    let mut dirs = String::new();
    for reference in &refs {
        let resolved = {
            let expanded = shellexpand::tilde(&reference.path);
            let p = Path::new(expanded.as_ref());
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                cwd.join(p)
            }
        };
        let rel = resolved
            .strip_prefix(cwd)
            .unwrap_or(&resolved)
            .display()
            .to_string();

        if resolved.is_dir() {
            dirs.push_str(&format!(
                "  <directory>\n    <path>{rel}</path>\n{}\n  </directory>\n",
                render_tree(&resolved)
            ));
        } else if resolved.is_file() {
            let slice = match read_file_slice(&resolved, reference.range) {
                Ok(s) => s,
                Err(e) => FileSlice {
                    content: String::new(),
                    metadata: Some(format!("Read error: {e}")),
                },
            };
            files.push_str("  <file>\n");
            files.push_str(&format!("    <path>{rel}</path>\n"));
            if let Some(meta) = &slice.metadata {
                files.push_str(&format!("    <metadata>{meta}</metadata>\n"));
            }
            files.push_str(&format!(
                "    <content><![CDATA[{}]]></content>\n",
                slice.content
            ));
            files.push_str("  </file>\n");
        }
    }

    if files.is_empty() && dirs.is_empty() {
        return None;
    }
    let mut out = String::new();
    if !files.is_empty() {
        out.push_str(&format!("<files>\n{files}</files>"));
    }
    if !dirs.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("<directory_structure>\n{dirs}</directory_structure>"));
    }
    Some(out)
}

fn render_tree(dir: &Path) -> String {
    let mut lines = Vec::new();
    let mut count = 0usize;
    for entry in WalkDir::new(dir)
        .max_depth(TREE_MAX_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !(name.starts_with('.') && name.len() > 1)
        })
        .filter_map(Result::ok)
    {
        if entry.depth() == 0 {
            continue;
        }
        if count >= TREE_MAX_ENTRIES {
            lines.push("    ...".to_string());
            break;
        }
        count += 1;
        let indent = "  ".repeat(entry.depth() + 1);
        let name = entry.file_name().to_string_lossy();
        let suffix = if entry.file_type().is_dir() { "/" } else { "" };
        lines.push(format!("{indent}{name}{suffix}"));
    }
    lines.join("\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extracts_bare_path() {
        let refs = extract_at_paths("explain @src/lib.rs please");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].path, "src/lib.rs");
        assert_eq!(refs[0].range, None);
    }

    #[test]
    fn extracts_quoted_path_with_spaces() {
        let refs = extract_at_paths(r#"see @"my docs/notes.md" for details"#);
        assert_eq!(refs[0].path, "my docs/notes.md");
    }

    #[test]
    fn extracts_single_line_and_range() {
        let refs = extract_at_paths("look at @a.txt:7 and @b.txt:1-5");
        assert_eq!(refs[0].range, Some(LineRange::single(7)));
        assert_eq!(refs[1].range, Some(LineRange { start: 1, end: 5 }));
    }

    #[test]
    fn deduplicates_repeated_references() {
        let refs = extract_at_paths("@a.txt then @a.txt again, plus @a.txt:1-2");
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn trailing_sentence_period_is_stripped() {
        let refs = extract_at_paths("read @README.md.");
        assert_eq!(refs[0].path, "README.md");
    }

    #[test]
    fn extraction_is_idempotent_on_expanded_text() {
        let prompt = "explain @a.txt:1-2";
        let first = extract_at_paths(prompt);
        let expanded = format!("{prompt}\n\n<files>\n  <file><path>a.txt</path></file>\n</files>");
        let second = extract_at_paths(&expanded);
        assert_eq!(first, second);
    }

    #[test]
    fn expands_file_with_range_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("README.md")).unwrap();
        for i in 1..=10 {
            writeln!(f, "L{i}").unwrap();
        }
        let block = expand_prompt_context(dir.path(), "explain @README.md:1-5").unwrap();
        assert!(block.contains("<path>README.md</path>"));
        assert!(block.contains("<metadata>Lines 1-5 of 10 total lines</metadata>"));
        assert!(block.contains("<![CDATA[L1\nL2\nL3\nL4\nL5]]>"));
    }

    #[test]
    fn directory_reference_renders_tree_without_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/sub")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "secret contents").unwrap();
        let block = expand_prompt_context(dir.path(), "map @src").unwrap();
        assert!(block.contains("<directory_structure>"));
        assert!(block.contains("lib.rs"));
        assert!(block.contains("sub/"));
        assert!(!block.contains("secret contents"));
    }

    #[test]
    fn missing_paths_expand_to_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(expand_prompt_context(dir.path(), "check @nope.txt").is_none());
    }

    #[test]
    fn prompt_without_references_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(expand_prompt_context(dir.path(), "no references here").is_none());
    }

    #[test]
    fn invalid_range_is_reported_in_metadata() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "one\ntwo\n").unwrap();
        let block = expand_prompt_context(dir.path(), "see @f.txt:5-2").unwrap();
        assert!(block.contains("<metadata>Invalid line range</metadata>"));
        assert!(block.contains("<![CDATA[]]>"));
    }
}

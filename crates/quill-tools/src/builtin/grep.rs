// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::tool::{require_str, Tool, ToolCategory, ToolCtx, ToolResult};

/// Leading matches are the highest-relevance ones; cap the list rather than
/// flooding the context.
const MAX_MATCHES: usize = 100;
/// Files larger than this are unlikely to be source and are skipped.
const MAX_SCAN_BYTES: u64 = 2 * 1024 * 1024;

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Searches file contents with a regular expression.\n\
         Output lines are formatted path:line:text, capped at 100 matches. Hidden\n\
         directories, .git and binary-looking files are skipped. Scope the search\n\
         with dir_path when the repository is large."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Rust-flavored regular expression to search for"
                },
                "dir_path": {
                    "type": "string",
                    "description": "Directory to search (default: working directory)"
                }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    fn needs_approval(&self, _args: &Value) -> bool {
        false
    }

    async fn execute(&self, ctx: &ToolCtx, args: Value) -> ToolResult {
        let pattern = match require_str(&args, "pattern") {
            Ok(p) => p.to_string(),
            Err(e) => return e,
        };
        let regex = match Regex::new(&pattern) {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("invalid pattern: {e}")),
        };
        let root = args
            .get("dir_path")
            .and_then(|v| v.as_str())
            .map(|p| ctx.resolve_path(p))
            .unwrap_or_else(|| ctx.cwd.clone());

        let mut matches: Vec<String> = Vec::new();
        let mut truncated = false;

        'walk: for entry in WalkDir::new(&root)
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
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.metadata().map(|m| m.len()).unwrap_or(0) > MAX_SCAN_BYTES {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(entry.path()) else {
                continue; // binary or unreadable
            };
            let rel = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .display()
                .to_string();
            for (lineno, line) in text.lines().enumerate() {
                if regex.is_match(line) {
                    if matches.len() >= MAX_MATCHES {
                        truncated = true;
                        break 'walk;
                    }
                    matches.push(format!("{rel}:{}:{}", lineno + 1, line.trim_end()));
                }
            }
        }

        if matches.is_empty() {
            return ToolResult::ok(format!("no matches for /{pattern}/"));
        }
        let mut text = matches.join("\n");
        if truncated {
            text.push_str(&format!("\n... (capped at {MAX_MATCHES} matches)"));
        }
        ToolResult::ok(text)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, ToolCtx) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn alpha() {}\nfn beta() {}\n").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.rs"), "fn alpha_two() {}\n").unwrap();
        let ctx = ToolCtx::for_cwd(dir.path());
        (dir, ctx)
    }

    #[tokio::test]
    async fn finds_matches_with_line_numbers() {
        let (_dir, ctx) = fixture();
        let out = GrepTool.execute(&ctx, json!({"pattern": "alpha"})).await;
        let text = out.llm_content.to_text();
        assert!(text.contains("a.rs:1:fn alpha() {}"));
        assert!(text.contains("b.rs:1:fn alpha_two() {}"));
        assert!(!text.contains("beta"));
    }

    #[tokio::test]
    async fn no_matches_is_not_an_error() {
        let (_dir, ctx) = fixture();
        let out = GrepTool.execute(&ctx, json!({"pattern": "gamma"})).await;
        assert!(!out.is_error);
        assert!(out.llm_content.to_text().contains("no matches"));
    }

    #[tokio::test]
    async fn invalid_regex_is_an_error_result() {
        let (_dir, ctx) = fixture();
        let out = GrepTool.execute(&ctx, json!({"pattern": "("})).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn hidden_directories_are_skipped() {
        let (dir, ctx) = fixture();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/config"), "alpha").unwrap();
        let out = GrepTool.execute(&ctx, json!({"pattern": "alpha"})).await;
        assert!(!out.llm_content.to_text().contains(".git"));
    }
}

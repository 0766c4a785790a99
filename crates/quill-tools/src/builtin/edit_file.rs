// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use similar::TextDiff;
use tracing::debug;

use quill_model::ReturnDisplay;

use crate::tool::{require_str, Tool, ToolCategory, ToolCtx, ToolResult};

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replaces an exact text span in a file.\n\
         old_string must match the file contents exactly, including whitespace, and\n\
         must be unique unless replace_all is set. Include enough surrounding context\n\
         to make the match unambiguous. Use write_file to create new files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path of the file to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence (default: false)"
                }
            },
            "required": ["path", "old_string", "new_string"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Write
    }

    async fn execute(&self, ctx: &ToolCtx, args: Value) -> ToolResult {
        let path = match require_str(&args, "path") {
            Ok(p) => p.to_string(),
            Err(e) => return e,
        };
        let old_string = match require_str(&args, "old_string") {
            Ok(s) => s.to_string(),
            Err(e) => return e,
        };
        let new_string = match require_str(&args, "new_string") {
            Ok(s) => s.to_string(),
            Err(e) => return e,
        };
        let replace_all = args
            .get("replace_all")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if old_string == new_string {
            return ToolResult::err("old_string and new_string are identical");
        }

        let resolved = ctx.resolve_path(&path);
        let old_text = match std::fs::read_to_string(&resolved) {
            Ok(t) => t,
            Err(e) => return ToolResult::err(format!("reading {}: {e}", resolved.display())),
        };

        let occurrences = old_text.matches(&old_string).count();
        if occurrences == 0 {
            return ToolResult::err(format!("old_string not found in {path}"));
        }
        if occurrences > 1 && !replace_all {
            return ToolResult::err(format!(
                "old_string matches {occurrences} locations in {path}; \
                 add surrounding context to make it unique or set replace_all"
            ));
        }

        let new_text = if replace_all {
            old_text.replace(&old_string, &new_string)
        } else {
            old_text.replacen(&old_string, &new_string, 1)
        };
        if let Err(e) = std::fs::write(&resolved, &new_text) {
            return ToolResult::err(format!("writing {}: {e}", resolved.display()));
        }

        let diff = TextDiff::from_lines(&old_text, &new_text);
        let mut added = 0usize;
        let mut removed = 0usize;
        for change in diff.iter_all_changes() {
            match change.tag() {
                similar::ChangeTag::Insert => added += 1,
                similar::ChangeTag::Delete => removed += 1,
                similar::ChangeTag::Equal => {}
            }
        }
        debug!(path = %resolved.display(), added, removed, "edit_file tool");

        ToolResult::ok(format!("Edited {path} (+{added} -{removed})")).with_display(
            ReturnDisplay::DiffViewer {
                path,
                old_text: Some(old_text),
                new_text,
            },
        )
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with(content: &str) -> (tempfile::TempDir, ToolCtx) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), content).unwrap();
        let ctx = ToolCtx::for_cwd(dir.path());
        (dir, ctx)
    }

    #[tokio::test]
    async fn replaces_unique_match() {
        let (dir, ctx) = ctx_with("fn main() {}\n");
        let out = EditFileTool
            .execute(
                &ctx,
                json!({"path": "f.txt", "old_string": "main", "new_string": "start"}),
            )
            .await;
        assert!(!out.is_error);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "fn start() {}\n"
        );
        assert!(out.llm_content.to_text().contains("+1 -1"));
    }

    #[tokio::test]
    async fn ambiguous_match_without_replace_all_fails() {
        let (_dir, ctx) = ctx_with("a a a\n");
        let out = EditFileTool
            .execute(
                &ctx,
                json!({"path": "f.txt", "old_string": "a", "new_string": "b"}),
            )
            .await;
        assert!(out.is_error);
        assert!(out.llm_content.to_text().contains("3 locations"));
    }

    #[tokio::test]
    async fn replace_all_rewrites_every_occurrence() {
        let (dir, ctx) = ctx_with("x y x\n");
        let out = EditFileTool
            .execute(
                &ctx,
                json!({"path": "f.txt", "old_string": "x", "new_string": "z", "replace_all": true}),
            )
            .await;
        assert!(!out.is_error);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "z y z\n"
        );
    }

    #[tokio::test]
    async fn missing_old_string_fails() {
        let (_dir, ctx) = ctx_with("hello\n");
        let out = EditFileTool
            .execute(
                &ctx,
                json!({"path": "f.txt", "old_string": "absent", "new_string": "x"}),
            )
            .await;
        assert!(out.is_error);
        assert!(out.llm_content.to_text().contains("not found"));
    }

    #[tokio::test]
    async fn identical_strings_fail_fast() {
        let (_dir, ctx) = ctx_with("hello\n");
        let out = EditFileTool
            .execute(
                &ctx,
                json!({"path": "f.txt", "old_string": "x", "new_string": "x"}),
            )
            .await;
        assert!(out.is_error);
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::fsread::{read_file_slice, LineRange, MAX_LINES};
use crate::tool::{require_str, Tool, ToolCategory, ToolCtx, ToolResult};

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads a text file from the filesystem.\n\
         Returns at most 2000 lines; longer files are cut with a notice. Lines longer\n\
         than 2000 characters are truncated. Files over 10 MB are skipped entirely.\n\
         Use offset/limit to page through large files: grep for the relevant region\n\
         first, then read only those lines. Paths are resolved against the working\n\
         directory unless absolute."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file"
                },
                "offset": {
                    "type": "integer",
                    "description": "1-indexed line number to start reading from (default 1)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return (default 2000)"
                }
            },
            "required": ["path"],
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
        let path = match require_str(&args, "path") {
            Ok(p) => p.to_string(),
            Err(e) => return e,
        };
        let offset = args.get("offset").and_then(|v| v.as_u64()).map(|n| n as usize);
        let limit = args.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize);

        debug!(path = %path, ?offset, ?limit, "read_file tool");

        let resolved = ctx.resolve_path(&path);
        let range = match (offset, limit) {
            (None, None) => None,
            (offset, limit) => {
                let start = offset.unwrap_or(1);
                let count = limit.unwrap_or(MAX_LINES);
                Some(LineRange {
                    start,
                    end: start.saturating_add(count.saturating_sub(1)),
                })
            }
        };

        match read_file_slice(&resolved, range) {
            Ok(slice) => {
                let text = match &slice.metadata {
                    Some(meta) if slice.content.is_empty() => meta.clone(),
                    Some(meta) => format!("{}\n\n{meta}", slice.content),
                    None => slice.content.clone(),
                };
                ToolResult::ok(text)
            }
            Err(e) => ToolResult::err(format!("read error: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ctx_with_file(lines: usize) -> (tempfile::TempDir, ToolCtx) {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("f.txt")).unwrap();
        for i in 1..=lines {
            writeln!(f, "L{i}").unwrap();
        }
        let ctx = ToolCtx::for_cwd(dir.path());
        (dir, ctx)
    }

    #[tokio::test]
    async fn reads_relative_path() {
        let (_dir, ctx) = ctx_with_file(3);
        let out = ReadFileTool
            .execute(&ctx, json!({"path": "f.txt"}))
            .await;
        assert!(!out.is_error);
        assert_eq!(out.llm_content.to_text(), "L1\nL2\nL3");
    }

    #[tokio::test]
    async fn offset_and_limit_select_window() {
        let (_dir, ctx) = ctx_with_file(10);
        let out = ReadFileTool
            .execute(&ctx, json!({"path": "f.txt", "offset": 4, "limit": 2}))
            .await;
        let text = out.llm_content.to_text();
        assert!(text.starts_with("L4\nL5"));
        assert!(text.contains("Lines 4-5 of 10 total lines"));
    }

    #[tokio::test]
    async fn missing_file_is_an_error_result() {
        let (_dir, ctx) = ctx_with_file(1);
        let out = ReadFileTool
            .execute(&ctx, json!({"path": "absent.txt"}))
            .await;
        assert!(out.is_error);
        assert!(out.llm_content.to_text().contains("read error"));
    }

    #[tokio::test]
    async fn missing_path_parameter_is_an_error_result() {
        let (_dir, ctx) = ctx_with_file(1);
        let out = ReadFileTool.execute(&ctx, json!({})).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn zero_offset_yields_invalid_range() {
        let (_dir, ctx) = ctx_with_file(3);
        let out = ReadFileTool
            .execute(&ctx, json!({"path": "f.txt", "offset": 0, "limit": 2}))
            .await;
        assert_eq!(out.llm_content.to_text(), "Invalid line range");
    }

    #[test]
    fn read_file_is_auto_approved() {
        assert!(!ReadFileTool.needs_approval(&json!({"path": "x"})));
        assert_eq!(ReadFileTool.category(), ToolCategory::Read);
    }
}

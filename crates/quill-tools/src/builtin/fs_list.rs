// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCategory, ToolCtx, ToolResult};

/// Entry cap so a node_modules-style directory cannot flood the context.
const MAX_ENTRIES: usize = 500;

pub struct LsTool;

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "Lists the entries of a directory, sorted by name. Directories carry a\n\
         trailing slash. Defaults to the working directory when dir_path is omitted."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dir_path": {
                    "type": "string",
                    "description": "Directory to list (default: working directory)"
                }
            },
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
        let dir = args
            .get("dir_path")
            .and_then(|v| v.as_str())
            .map(|p| ctx.resolve_path(p))
            .unwrap_or_else(|| ctx.cwd.clone());

        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) => return ToolResult::err(format!("listing {}: {e}", dir.display())),
        };

        let mut names: Vec<String> = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            names.push(if is_dir { format!("{name}/") } else { name });
        }
        names.sort();

        let total = names.len();
        let mut text = names
            .into_iter()
            .take(MAX_ENTRIES)
            .collect::<Vec<_>>()
            .join("\n");
        if total > MAX_ENTRIES {
            text.push_str(&format!("\n... ({} more entries)", total - MAX_ENTRIES));
        }
        if text.is_empty() {
            text = "(empty directory)".to_string();
        }
        ToolResult::ok(text)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_sorted_with_dir_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let ctx = ToolCtx::for_cwd(dir.path());
        let out = LsTool.execute(&ctx, json!({})).await;
        assert_eq!(out.llm_content.to_text(), "a.txt\nb.txt\nsub/");
    }

    #[tokio::test]
    async fn missing_directory_is_an_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolCtx::for_cwd(dir.path());
        let out = LsTool.execute(&ctx, json!({"dir_path": "absent"})).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn empty_directory_reports_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolCtx::for_cwd(dir.path());
        let out = LsTool.execute(&ctx, json!({})).await;
        assert_eq!(out.llm_content.to_text(), "(empty directory)");
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use quill_model::ReturnDisplay;

use crate::tool::{require_str, Tool, ToolCategory, ToolCtx, ToolResult};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Writes content to a file, creating it (and any missing parent directories)\n\
         or overwriting it completely. For partial changes to an existing file prefer\n\
         edit_file — it preserves the rest of the file and produces a reviewable diff."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path of the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content"
                }
            },
            "required": ["path", "content"],
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
        let content = match require_str(&args, "content") {
            Ok(c) => c.to_string(),
            Err(e) => return e,
        };

        let resolved = ctx.resolve_path(&path);
        debug!(path = %resolved.display(), bytes = content.len(), "write_file tool");

        let old_text = std::fs::read_to_string(&resolved).ok();
        if let Some(parent) = resolved.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolResult::err(format!("creating {}: {e}", parent.display()));
            }
        }
        if let Err(e) = std::fs::write(&resolved, &content) {
            return ToolResult::err(format!("writing {}: {e}", resolved.display()));
        }

        let verb = if old_text.is_some() { "Overwrote" } else { "Created" };
        ToolResult::ok(format!("{verb} {path} ({} bytes)", content.len())).with_display(
            ReturnDisplay::DiffViewer {
                path,
                old_text,
                new_text: content,
            },
        )
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

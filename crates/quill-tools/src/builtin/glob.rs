// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::SystemTime;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::tool::{require_str, Tool, ToolCategory, ToolCtx, ToolResult};

const MAX_RESULTS: usize = 200;

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Finds files whose relative path matches a glob pattern.\n\
         Supports * (within a component), ** (across components) and ?. Results are\n\
         sorted by modification time, newest first, capped at 200."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern, e.g. src/**/*.rs"
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
        let Some(regex) = glob_to_regex(&pattern) else {
            return ToolResult::err(format!("invalid glob pattern: {pattern}"));
        };
        let root = args
            .get("dir_path")
            .and_then(|v| v.as_str())
            .map(|p| ctx.resolve_path(p))
            .unwrap_or_else(|| ctx.cwd.clone());

        let mut hits: Vec<(SystemTime, String)> = Vec::new();
        for entry in WalkDir::new(&root)
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
            let rel = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .into_owned();
            if regex.is_match(&rel) {
                let mtime = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                hits.push((mtime, rel));
            }
        }

        hits.sort_by(|a, b| b.0.cmp(&a.0));
        let total = hits.len();
        if total == 0 {
            return ToolResult::ok(format!("no files match {pattern}"));
        }
        let mut text = hits
            .into_iter()
            .take(MAX_RESULTS)
            .map(|(_, p)| p)
            .collect::<Vec<_>>()
            .join("\n");
        if total > MAX_RESULTS {
            text.push_str(&format!("\n... ({} more files)", total - MAX_RESULTS));
        }
        ToolResult::ok(text)
    }
}

/// Translate a glob into an anchored regex.  `**` crosses path separators,
/// `*` stays within one component, `?` matches a single character.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // Swallow a following separator so `**/` also matches
                    // the empty prefix.
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        re.push_str("(?:.*/)?");
                    } else {
                        re.push_str(".*");
                    }
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

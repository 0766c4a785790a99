// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{require_str, Tool, ToolCategory, ToolCtx, ToolResult};

/// Response body cap after text conversion.
const MAX_CONTENT_CHARS: usize = 50_000;
const USER_AGENT: &str = concat!("quill/", env!("CARGO_PKG_VERSION"));

pub struct FetchTool {
    client: reqwest::Client,
}

impl Default for FetchTool {
    fn default() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Tool for FetchTool {
    fn name(&self) -> &str {
        "fetch"
    }

    fn description(&self) -> &str {
        "Fetches a URL over HTTP GET and returns the body as text.\n\
         HTML responses are converted to plain text. Output is capped at 50,000\n\
         characters. Only http:// and https:// URLs are accepted."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch"
                }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Network
    }

    async fn execute(&self, ctx: &ToolCtx, args: Value) -> ToolResult {
        let url = match require_str(&args, "url") {
            Ok(u) => u.to_string(),
            Err(e) => return e,
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ToolResult::err(format!("unsupported URL scheme: {url}"));
        }
        debug!(url = %url, "fetch tool");

        let request = self.client.get(&url).send();
        let response = tokio::select! {
            _ = ctx.cancel.cancelled() => return ToolResult::err("fetch canceled"),
            r = request => r,
        };
        let response = match response {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("fetch failed: {e}")),
        };
        let status = response.status();
        if !status.is_success() {
            return ToolResult::err(format!("fetch failed: {url} returned {status}"));
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);

        let body = tokio::select! {
            _ = ctx.cancel.cancelled() => return ToolResult::err("fetch canceled"),
            b = response.text() => b,
        };
        let body = match body {
            Ok(b) => b,
            Err(e) => return ToolResult::err(format!("reading body failed: {e}")),
        };

        let mut text = if is_html {
            html2text::from_read(body.as_bytes(), 100)
        } else {
            body
        };
        if text.chars().count() > MAX_CONTENT_CHARS {
            text = text.chars().take(MAX_CONTENT_CHARS).collect();
            text.push_str("\n... [truncated]");
        }
        ToolResult::ok(text)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

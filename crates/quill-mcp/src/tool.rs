// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use quill_tools::{mcp_tool_name, Tool, ToolCategory, ToolCtx, ToolResult};

use crate::client::{McpClient, RemoteToolInfo};

/// A remote tool surfaced through the local registry as
/// `mcp__<server>__<tool>`.
pub struct McpTool {
    local_name: String,
    remote_name: String,
    description: String,
    schema: Value,
    client: Arc<McpClient>,
}

impl McpTool {
    pub fn new(server: &str, info: RemoteToolInfo, client: Arc<McpClient>) -> Self {
        Self {
            local_name: mcp_tool_name(server, &info.name),
            remote_name: info.name,
            description: info.description,
            schema: info.input_schema,
            client,
        }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.local_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    /// Remote tools reach out of the process; they carry the network
    /// category and always go through approval unless session policy says
    /// otherwise.
    fn category(&self) -> ToolCategory {
        ToolCategory::Network
    }

    async fn execute(&self, ctx: &ToolCtx, args: Value) -> ToolResult {
        let call = self.client.call(&self.remote_name, args);
        tokio::select! {
            _ = ctx.cancel.cancelled() => ToolResult::err("tool call canceled"),
            result = call => match result {
                Ok(payload) => payload,
                Err(e) => ToolResult::err(e.to_string()),
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_name_is_prefixed_and_sanitized() {
        // Naming only; no live client needed.
        assert_eq!(mcp_tool_name("files.api", "search"), "mcp__filesapi__search");
    }
}

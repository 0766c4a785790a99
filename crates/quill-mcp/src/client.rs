// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Thin wrapper over the rmcp client: spawn-or-dial, `tools()`, `call()`,
//! `close()`.  The manager owns instances and decides retry policy; this
//! type only knows how to talk to one server.

use std::borrow::Cow;
use std::process::Stdio;
use std::time::Duration;

use rmcp::model::{CallToolRequestParams, RawContent};
use rmcp::service::{Peer, RunningService};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::{ClientHandler, RoleClient, ServiceExt};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use quill_model::{LlmContent, ToolResultPart, ToolResultPayload};

use crate::config::{McpServerConfig, ServerShape};
use crate::errors::McpError;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Client handler with the rmcp defaults; quill does not serve
/// sampling/elicitation back to servers.
#[derive(Clone, Debug, Default)]
struct QuillClientHandler;

impl ClientHandler for QuillClientHandler {}

/// A remote tool as advertised by a server.
#[derive(Debug, Clone)]
pub struct RemoteToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug)]
pub struct McpClient {
    server_name: String,
    /// Cheap-to-clone request handle; shared by every tool adapter.
    peer: Peer<RoleClient>,
    /// The running service, kept so `close` can cancel it.  `None` after
    /// close.
    service: tokio::sync::Mutex<Option<RunningService<RoleClient, QuillClientHandler>>>,
    call_timeout: Duration,
}

impl McpClient {
    /// Connect per the config shape: spawn a stdio server or dial a URL.
    pub async fn connect(server_name: &str, config: &McpServerConfig) -> Result<Self, McpError> {
        let call_timeout = config
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CALL_TIMEOUT);

        let service = match config.shape()? {
            ServerShape::Stdio { command, args, env } => {
                debug!(server = server_name, command = %command, "spawning stdio MCP server");
                let mut cmd = Command::new(&command);
                cmd.args(&args);
                cmd.envs(&env);
                cmd.stdin(Stdio::piped());
                cmd.stdout(Stdio::piped());
                cmd.stderr(Stdio::null());
                cmd.kill_on_drop(true);
                let mut child = cmd.spawn().map_err(|e| McpError::Spawn {
                    command: command.clone(),
                    message: e.to_string(),
                })?;
                let stdout = child.stdout.take().ok_or_else(|| McpError::Spawn {
                    command: command.clone(),
                    message: "no stdout pipe".into(),
                })?;
                let stdin = child.stdin.take().ok_or_else(|| McpError::Spawn {
                    command: command.clone(),
                    message: "no stdin pipe".into(),
                })?;
                // The child's lifetime is tied to the transport pipes;
                // kill_on_drop reaps it if the handshake fails.
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
                QuillClientHandler
                    .serve((stdout, stdin))
                    .await
                    .map_err(|e| McpError::Connect(format!("{e:?}")))?
            }
            ServerShape::Url { url, headers } => {
                debug!(server = server_name, url = %url, "dialling MCP server");
                let transport = if headers.is_empty() {
                    StreamableHttpClientTransport::from_uri(url.clone())
                } else {
                    let mut header_map = reqwest::header::HeaderMap::new();
                    for (k, v) in &headers {
                        let name = reqwest::header::HeaderName::from_bytes(k.as_bytes())
                            .map_err(|e| McpError::InvalidConfig(format!("malformed header {k}: {e}")))?;
                        let value = v
                            .parse()
                            .map_err(|_| McpError::InvalidConfig(format!("malformed header value for {k}")))?;
                        header_map.insert(name, value);
                    }
                    let client = reqwest::Client::builder()
                        .default_headers(header_map)
                        .build()
                        .map_err(|e| McpError::Connect(e.to_string()))?;
                    StreamableHttpClientTransport::with_client(
                        client,
                        StreamableHttpClientTransportConfig::with_uri(url.clone()),
                    )
                };
                QuillClientHandler
                    .serve(transport)
                    .await
                    .map_err(|e| McpError::Connect(format!("{e:?}")))?
            }
        };

        Ok(Self {
            server_name: server_name.to_string(),
            peer: service.peer().clone(),
            service: tokio::sync::Mutex::new(Some(service)),
            call_timeout,
        })
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// List the server's tools.
    pub async fn tools(&self) -> Result<Vec<RemoteToolInfo>, McpError> {
        let result = tokio::time::timeout(self.call_timeout, self.peer.list_tools(None))
            .await
            .map_err(|_| McpError::Timeout("tools/list".into()))?
            .map_err(|e| McpError::Protocol(format!("{e:?}")))?;
        Ok(result
            .tools
            .into_iter()
            .map(|t| RemoteToolInfo {
                name: t.name.to_string(),
                description: t.description.as_deref().unwrap_or_default().to_string(),
                input_schema: serde_json::to_value(&*t.input_schema)
                    .unwrap_or_else(|_| serde_json::json!({"type": "object"})),
            })
            .collect())
    }

    /// Invoke a tool and normalize the result payload.
    pub async fn call(&self, tool: &str, args: Value) -> Result<ToolResultPayload, McpError> {
        let arguments = match args {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                // Non-object arguments are wrapped so the call stays valid.
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                Some(map)
            }
        };
        let params = CallToolRequestParams {
            meta: None,
            name: Cow::Owned(tool.to_string()),
            arguments,
            task: None,
        };
        let result = tokio::time::timeout(self.call_timeout, self.peer.call_tool(params))
            .await
            .map_err(|_| McpError::Timeout(tool.to_string()))?
            .map_err(|e| McpError::ToolCall {
                tool: tool.to_string(),
                message: format!("{e:?}"),
            })?;

        let is_error = result.is_error.unwrap_or(false);
        let mut parts: Vec<ToolResultPart> = Vec::new();
        for item in &result.content {
            match &**item {
                RawContent::Text(t) => parts.push(ToolResultPart::Text {
                    text: t.text.clone(),
                }),
                RawContent::Image(img) => parts.push(ToolResultPart::Image {
                    data: img.data.clone(),
                    mime_type: img.mime_type.clone(),
                }),
                other => {
                    // Resources and future content kinds are stringified so
                    // nothing the server said is silently dropped.
                    let text = serde_json::to_string(other)
                        .unwrap_or_else(|_| "[unrepresentable content]".to_string());
                    parts.push(ToolResultPart::Text { text });
                }
            }
        }

        let llm_content = normalize_parts(parts);
        Ok(ToolResultPayload {
            llm_content,
            return_display: None,
            is_error,
        })
    }

    /// Shut the connection down.  A failed close is logged, not fatal;
    /// closing twice is a no-op.
    pub async fn close(&self) {
        let service = self.service.lock().await.take();
        if let Some(service) = service {
            if let Err(e) = service.cancel().await {
                warn!(server = %self.server_name, error = ?e, "error closing MCP client");
            }
        }
    }
}

/// Collapse a parts list: a single text part becomes plain text; any mix
/// with images stays structured; an empty list becomes an empty string.
pub(crate) fn normalize_parts(parts: Vec<ToolResultPart>) -> LlmContent {
    match parts.len() {
        0 => LlmContent::Text(String::new()),
        1 => match parts.into_iter().next() {
            Some(ToolResultPart::Text { text }) => LlmContent::Text(text),
            Some(part) => LlmContent::Parts(vec![part]),
            None => LlmContent::Text(String::new()),
        },
        _ => LlmContent::Parts(parts),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_text_part_collapses_to_text() {
        let content = normalize_parts(vec![ToolResultPart::Text {
            text: "hello".into(),
        }]);
        assert_eq!(content, LlmContent::Text("hello".into()));
    }

    #[test]
    fn mixed_parts_stay_structured() {
        let content = normalize_parts(vec![
            ToolResultPart::Text { text: "a".into() },
            ToolResultPart::Image {
                data: "AAAA".into(),
                mime_type: "image/png".into(),
            },
        ]);
        assert!(matches!(content, LlmContent::Parts(p) if p.len() == 2));
    }

    #[test]
    fn empty_parts_become_empty_text() {
        assert_eq!(normalize_parts(vec![]), LlmContent::Text(String::new()));
    }

    #[tokio::test]
    async fn connect_to_missing_command_reports_spawn_error() {
        let cfg = McpServerConfig::stdio("definitely-not-a-real-binary-xyz", vec![]);
        let err = McpClient::connect("srv", &cfg).await.unwrap_err();
        assert!(matches!(err, McpError::Spawn { .. }));
    }
}

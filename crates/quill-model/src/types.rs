// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ─── Content part types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One part of a message body.
///
/// User and assistant messages carry an ordered sequence of parts; tool
/// messages carry `tool_result` parts.  The `Unknown` fallback preserves
/// parts written by newer versions so that a log round-trips byte-for-byte
/// at the JSON level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        /// Base64 payload, no data-URL prefix.
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    File {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Model-internal thought.  Assistant messages only.
    Reasoning {
        text: String,
    },
    /// The assistant requests a tool invocation.
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// The outcome of a tool invocation.  Tool messages only.
    ToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: Value,
        result: ToolResultPayload,
    },
    #[serde(untagged)]
    Unknown(Value),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Content a tool feeds back to the model: a plain string or a mix of text
/// and image blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LlmContent {
    Text(String),
    Parts(Vec<ToolResultPart>),
}

impl LlmContent {
    /// Plain-text rendering; image parts are summarised as a placeholder.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ToolResultPart::Text { text } => text.as_str(),
                    ToolResultPart::Image { .. } => "[image]",
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<String> for LlmContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for LlmContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultPart {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
}

/// Structured render hint a tool may attach for frontends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReturnDisplay {
    Text {
        text: String,
    },
    DiffViewer {
        path: String,
        #[serde(rename = "oldText", default, skip_serializing_if = "Option::is_none")]
        old_text: Option<String>,
        #[serde(rename = "newText")]
        new_text: String,
    },
    TodoRead {
        todos: Vec<TodoItem>,
    },
    TodoWrite {
        #[serde(rename = "oldTodos")]
        old_todos: Vec<TodoItem>,
        #[serde(rename = "newTodos")]
        new_todos: Vec<TodoItem>,
    },
}

/// The result of executing a tool, as fed back to the model and surfaced to
/// frontends.  Failures are data, not unwinds: `is_error` is set and
/// `llm_content` carries the message so the model can adapt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultPayload {
    #[serde(rename = "llmContent")]
    pub llm_content: LlmContent,
    #[serde(
        rename = "returnDisplay",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub return_display: Option<ReturnDisplay>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolResultPayload {
    pub fn ok(content: impl Into<LlmContent>) -> Self {
        Self {
            llm_content: content.into(),
            return_display: None,
            is_error: false,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            llm_content: LlmContent::Text(message.into()),
            return_display: None,
            is_error: true,
        }
    }

    pub fn with_display(mut self, display: ReturnDisplay) -> Self {
        self.return_display = Some(display);
        self
    }
}

// ─── Message ──────────────────────────────────────────────────────────────────

fn message_kind() -> String {
    "message".to_string()
}

/// One entry in a conversation.
///
/// Messages form a DAG through `parent_uuid` that is linear by convention but
/// may fork.  Unknown top-level fields survive a load/append round-trip via
/// the flattened `extra` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub uuid: String,
    #[serde(rename = "parentUuid")]
    pub parent_uuid: Option<String>,
    pub role: Role,
    pub content: Vec<ContentPart>,
    /// RFC 3339 creation time.
    pub timestamp: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "type", default = "message_kind")]
    pub kind: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Message {
    pub fn new(role: Role, session_id: impl Into<String>, content: Vec<ContentPart>) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            parent_uuid: None,
            role,
            content,
            timestamp: Utc::now().to_rfc3339(),
            session_id: session_id.into(),
            kind: message_kind(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn user(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Role::User, session_id, vec![ContentPart::text(text.into())])
    }

    pub fn assistant(session_id: impl Into<String>, content: Vec<ContentPart>) -> Self {
        Self::new(Role::Assistant, session_id, content)
    }

    pub fn system(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            Role::System,
            session_id,
            vec![ContentPart::text(text.into())],
        )
    }

    /// A tool message carrying a single result for `tool_call_id`.
    pub fn tool_result(
        session_id: impl Into<String>,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
        result: ToolResultPayload,
    ) -> Self {
        Self::new(
            Role::Tool,
            session_id,
            vec![ContentPart::ToolResult {
                tool_call_id: tool_call_id.into(),
                tool_name: tool_name.into(),
                input,
                result,
            }],
        )
    }

    /// Concatenated text of all `text` parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// All `tool_use` parts as `(id, name, input)` triples, in message order.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &Value)> {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }

    /// All `tool_result` part call ids in this message.
    pub fn tool_result_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolResult { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_images(&self) -> bool {
        self.content
            .iter()
            .any(|p| matches!(p, ContentPart::Image { .. }))
    }

    /// Approximate token count used for context budgeting.
    ///
    /// Uses the 4-chars-per-token heuristic for text; image and file parts
    /// use a fixed 765-token estimate (the typical cost of a 512×512 region).
    pub fn approx_tokens(&self) -> usize {
        let chars: usize = self
            .content
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } | ContentPart::Reasoning { text } => text.len(),
                ContentPart::Image { .. } | ContentPart::File { .. } => 765 * 4,
                ContentPart::ToolUse { name, input, .. } => name.len() + input.to_string().len(),
                ContentPart::ToolResult { result, .. } => result.llm_content.to_text().len(),
                ContentPart::Unknown(v) => v.to_string().len(),
            })
            .sum();
        (chars / 4).max(1)
    }
}

// ─── Provider request/response ────────────────────────────────────────────────

/// A tool schema provided to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
}

/// Request sent to a model provider.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub system_prompt: Option<String>,
    /// Provider-specific reasoning budget; `None` disables extended thinking.
    pub thinking: Option<crate::catalog::ThinkingConfig>,
}

impl CompletionRequest {
    /// Projected prompt size in tokens, including tool schemas and the
    /// system prompt.  Input to the auto-compaction decision.
    pub fn approx_tokens(&self) -> usize {
        let msg_tokens: usize = self.messages.iter().map(|m| m.approx_tokens()).sum();
        let schema_tokens: usize = self
            .tools
            .iter()
            .map(|t| (t.name.len() + t.description.len() + t.parameters.to_string().len()) / 4)
            .sum();
        let system_tokens = self.system_prompt.as_ref().map(|s| s.len() / 4).unwrap_or(0);
        msg_tokens + schema_tokens + system_tokens
    }
}

/// A single streamed event from a model provider.
///
/// Tool-call arguments may arrive fragmented across several events sharing
/// the same `index`; the stream engine buffers and assembles them.
#[derive(Debug, Clone)]
pub enum ResponseEvent {
    TextDelta(String),
    ReasoningDelta(String),
    ToolCallDelta {
        index: u32,
        id: String,
        name: String,
        arguments: String,
    },
    Usage(Usage),
    Done,
    /// A recoverable in-stream warning; the stream continues.
    Warning(String),
}

/// Token usage from one completion attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

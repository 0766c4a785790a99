// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use quill_model::{Message, ToolResultPayload, Usage};
use serde_json::Value;

use crate::stream::StreamAttempt;

/// Events emitted by the turn loop during one `send`.
///
/// Consumers (the bridge, tests, the headless runner) receive these over an
/// mpsc channel and multiplex them onward — to bus topics, plugin hooks, or
/// stdout.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// A message was appended to the session log.
    Message(Message),
    /// Streaming text chunk for the assistant message identified by `uuid`.
    TextDelta { uuid: String, delta: String },
    /// Streaming reasoning chunk.
    ReasoningDelta { uuid: String, delta: String },
    /// The model requested a tool invocation.
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// A tool invocation resolved (executed, denied, or synthesized).
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: ToolResultPayload,
    },
    /// One stream attempt finished (successfully or not).
    StreamResult(StreamAttempt),
    /// One model turn completed.
    Turn { usage: Usage, duration_ms: u64 },
}

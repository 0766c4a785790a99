// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! One model invocation: send the request, decode the chunk stream, retry
//! with backoff, assemble fragmented tool calls, capture diagnostics.
//!
//! The engine owns the retry boundary: retries happen *before* any tool is
//! dispatched, so a retried request can never re-execute a tool.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use quill_model::{CompletionRequest, ModelProvider, ProviderError, ResponseEvent, Usage};
use quill_session::RequestLogWriter;

use crate::error::KernelError;
use crate::events::TurnEvent;

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// A fully-assembled tool call ready for dispatch.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Terminal record of one attempt, emitted per attempt for diagnostics.
#[derive(Debug, Clone)]
pub struct StreamAttempt {
    pub request_id: String,
    pub model: String,
    pub retry_attempt: u32,
    pub max_retries: u32,
    pub error: Option<String>,
}

/// Everything one successful stream produced.
#[derive(Debug)]
pub struct StreamOutcome {
    /// Minted per attempt; becomes the assistant message uuid, so request
    /// logs key by assistant uuid.
    pub request_id: String,
    pub text: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Usage,
}

#[derive(Debug, Clone)]
pub struct StreamEngine {
    pub max_retries: u32,
    /// When set, every attempt is captured to `<requestId>.jsonl` here.
    pub request_log_dir: Option<PathBuf>,
}

impl Default for StreamEngine {
    fn default() -> Self {
        Self {
            max_retries: 3,
            request_log_dir: None,
        }
    }
}

impl StreamEngine {
    pub async fn run(
        &self,
        provider: &dyn ModelProvider,
        request: &CompletionRequest,
        cancel: &CancellationToken,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<StreamOutcome, KernelError> {
        let model = provider.model_name().to_string();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(KernelError::Canceled);
            }
            let request_id = Uuid::new_v4().to_string();
            let mut log = self.open_request_log(&request_id, &model, request);

            match self
                .run_attempt(provider, request, cancel, events, &request_id, log.as_mut())
                .await
            {
                Ok(outcome) => {
                    let _ = events
                        .send(TurnEvent::StreamResult(StreamAttempt {
                            request_id: request_id.clone(),
                            model: model.clone(),
                            retry_attempt: attempt,
                            max_retries: self.max_retries,
                            error: None,
                        }))
                        .await;
                    return Ok(outcome);
                }
                Err(AttemptError::Canceled) => return Err(KernelError::Canceled),
                Err(AttemptError::Provider(e)) => {
                    let _ = events
                        .send(TurnEvent::StreamResult(StreamAttempt {
                            request_id: request_id.clone(),
                            model: model.clone(),
                            retry_attempt: attempt,
                            max_retries: self.max_retries,
                            error: Some(e.to_string()),
                        }))
                        .await;

                    if e.retryable() && attempt < self.max_retries {
                        let delay = backoff_delay(attempt, e.retry_after());
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retryable stream error; backing off"
                        );
                        attempt += 1;
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(KernelError::Canceled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                        continue;
                    }
                    return Err(map_provider_error(e));
                }
            }
        }
    }

    async fn run_attempt(
        &self,
        provider: &dyn ModelProvider,
        request: &CompletionRequest,
        cancel: &CancellationToken,
        events: &mpsc::Sender<TurnEvent>,
        request_id: &str,
        mut log: Option<&mut RequestLogWriter>,
    ) -> Result<StreamOutcome, AttemptError> {
        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return Err(AttemptError::Canceled),
            result = provider.complete(request.clone()) => result.map_err(AttemptError::Provider)?,
        };

        let mut text = String::new();
        let mut reasoning = String::new();
        let mut usage = Usage::default();
        // Keyed by the provider's parallel-tool-call index: fragments for
        // different calls may interleave.
        let mut pending: HashMap<u32, PendingToolCall> = HashMap::new();

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return Err(AttemptError::Canceled),
                event = stream.next() => event,
            };
            let Some(event) = event else { break };
            let event = event.map_err(AttemptError::Provider)?;

            if let Some(log) = log.as_deref_mut() {
                if let Err(e) = log.append_chunk(&chunk_json(&event)) {
                    warn!(error = %e, "request log write failed");
                }
            }

            match event {
                ResponseEvent::TextDelta(delta) if !delta.is_empty() => {
                    text.push_str(&delta);
                    let _ = events
                        .send(TurnEvent::TextDelta {
                            uuid: request_id.to_string(),
                            delta,
                        })
                        .await;
                }
                ResponseEvent::TextDelta(_) => {}
                ResponseEvent::ReasoningDelta(delta) => {
                    reasoning.push_str(&delta);
                    let _ = events
                        .send(TurnEvent::ReasoningDelta {
                            uuid: request_id.to_string(),
                            delta,
                        })
                        .await;
                }
                ResponseEvent::ToolCallDelta {
                    index,
                    id,
                    name,
                    arguments,
                } => {
                    let entry = pending.entry(index).or_default();
                    if !id.is_empty() {
                        entry.id = id;
                    }
                    if !name.is_empty() {
                        entry.name = name;
                    }
                    entry.args_buf.push_str(&arguments);
                }
                ResponseEvent::Usage(u) => usage.add(u),
                ResponseEvent::Warning(message) => {
                    warn!(message = %message, "model stream warning");
                }
                ResponseEvent::Done => break,
            }
        }

        // Flush assembled tool calls ordered by provider index.  Calls with
        // an empty name cannot be dispatched and are dropped; an empty id
        // gets a synthetic fallback so the turn can still complete.
        let mut ordered: Vec<(u32, PendingToolCall)> = pending.into_iter().collect();
        ordered.sort_by_key(|(index, _)| *index);
        let mut tool_calls = Vec::new();
        for (i, (_, entry)) in ordered.into_iter().enumerate() {
            if entry.name.is_empty() {
                warn!(tool_call_id = %entry.id, "dropping tool call with empty name");
                continue;
            }
            let mut call = entry.finish();
            if call.id.is_empty() {
                call.id = format!("call_synthetic_{i}");
                warn!(tool = %call.name, "tool call had empty id; generated synthetic id");
            }
            tool_calls.push(call);
        }

        debug!(
            request_id,
            text_len = text.len(),
            tool_calls = tool_calls.len(),
            "stream attempt complete"
        );

        Ok(StreamOutcome {
            request_id: request_id.to_string(),
            text,
            reasoning,
            tool_calls,
            usage,
        })
    }

    fn open_request_log(
        &self,
        request_id: &str,
        model: &str,
        request: &CompletionRequest,
    ) -> Option<RequestLogWriter> {
        let dir = self.request_log_dir.as_ref()?;
        let metadata = json!({
            "request": request_id,
            "model": model,
            "prompt": request.messages,
            "tools": request.tools.iter().map(|t| t.name.clone()).collect::<Vec<_>>(),
            "response": Value::Null,
        });
        match RequestLogWriter::create(dir, request_id, &metadata) {
            Ok(writer) => Some(writer),
            Err(e) => {
                warn!(error = %e, "failed to open request log");
                None
            }
        }
    }
}

enum AttemptError {
    Canceled,
    Provider(ProviderError),
}

fn map_provider_error(e: ProviderError) -> KernelError {
    match e {
        ProviderError::Unauthenticated(m) => KernelError::Unauthenticated(m),
        other => KernelError::Api {
            retryable: other.retryable(),
            message: other.to_string(),
        },
    }
}

/// Exponential backoff with full jitter, honoring a provider retry-after
/// hint when present.
fn backoff_delay(attempt: u32, hint: Option<Duration>) -> Duration {
    if let Some(hint) = hint {
        return hint.min(BACKOFF_CAP);
    }
    let exp = BACKOFF_BASE.saturating_mul(2u32.saturating_pow(attempt));
    let capped = exp.min(BACKOFF_CAP);
    let jitter = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 2);
    capped / 2 + Duration::from_millis(jitter)
}

fn chunk_json(event: &ResponseEvent) -> Value {
    match event {
        ResponseEvent::TextDelta(d) => json!({"textDelta": d}),
        ResponseEvent::ReasoningDelta(d) => json!({"reasoningDelta": d}),
        ResponseEvent::ToolCallDelta {
            index,
            id,
            name,
            arguments,
        } => json!({"toolCallDelta": {"index": index, "id": id, "name": name, "arguments": arguments}}),
        ResponseEvent::Usage(u) => json!({"usage": {"input": u.input_tokens, "output": u.output_tokens}}),
        ResponseEvent::Warning(m) => json!({"warning": m}),
        ResponseEvent::Done => json!({"finish": true}),
    }
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args_buf: String,
}

impl PendingToolCall {
    /// Always resolve to a JSON object: providers reject `null` tool input
    /// on the next request, which would poison the whole conversation.
    fn finish(self) -> ToolCallRequest {
        let input = if self.args_buf.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(&self.args_buf) {
                Ok(v) => v,
                Err(parse_err) => match repair_json(&self.args_buf) {
                    Some(v) => {
                        warn!(tool = %self.name, "repaired invalid JSON tool arguments");
                        v
                    }
                    None => {
                        warn!(
                            tool = %self.name,
                            error = %parse_err,
                            "unparseable tool arguments; substituting {{}}"
                        );
                        Value::Object(Default::default())
                    }
                },
            }
        };
        ToolCallRequest {
            id: self.id,
            name: self.name,
            input,
        }
    }
}

/// Best-effort repair of common model JSON mistakes: invalid escape
/// sequences inside strings, and a missing closing quote/brace when the
/// arguments were cut off mid-stream.
fn repair_json(raw: &str) -> Option<Value> {
    let fixed = fix_invalid_escapes(raw);
    if let Ok(v) = serde_json::from_str(&fixed) {
        return Some(v);
    }
    if !fixed.trim_end().ends_with('}') {
        let mut completed = fixed;
        if completed.chars().filter(|&c| c == '"').count() % 2 == 1 {
            completed.push('"');
        }
        completed.push('}');
        if let Ok(v) = serde_json::from_str(&completed) {
            return Some(v);
        }
    }
    None
}

/// Replace invalid JSON escapes (`\c`, `\(` …) inside string values with an
/// escaped backslash so serde can parse.
fn fix_invalid_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 16);
    let mut chars = raw.chars();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => match chars.next() {
                    Some(next)
                        if matches!(next, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') =>
                    {
                        out.push('\\');
                        out.push(next);
                    }
                    Some(next) => {
                        out.push('\\');
                        out.push('\\');
                        out.push(next);
                    }
                    None => out.push('\\'),
                },
                '"' => {
                    in_string = false;
                    out.push('"');
                }
                _ => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

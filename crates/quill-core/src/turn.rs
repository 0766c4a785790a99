// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The multi-turn driver: stream one assistant reply, dispatch its tool
//! calls through the approval gate, feed results back, repeat until the
//! model stops calling tools.
//!
//! Ordering guarantees: the assistant message is persisted before any of
//! its tool results; results are persisted in the order the model issued
//! the calls.  Each `tool_use.id` is executed at most once per loop
//! invocation — stream retries happen inside the engine, before dispatch.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use quill_model::{CompletionRequest, ContentPart, Message, ModelProvider, ToolResultPayload};
use quill_session::SessionLog;
use quill_tools::{ToolCtx, ToolRegistry};

use crate::approval::{ApprovalDecision, ApprovalGate};
use crate::compact::{should_compact, Compactor};
use crate::error::KernelError;
use crate::events::TurnEvent;
use crate::stream::{StreamEngine, StreamOutcome, ToolCallRequest};

/// Placeholder text recorded for tool calls interrupted by a cancel.
pub const CANCEL_NOTICE: &str = "[Request interrupted by user]";

#[derive(Debug, Clone)]
pub struct TurnLoopOptions {
    pub max_turns: u32,
    pub auto_compact: bool,
}

impl Default for TurnLoopOptions {
    fn default() -> Self {
        Self {
            max_turns: 50,
            auto_compact: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEnd {
    Completed,
    Canceled,
    MaxTurnsExceeded,
}

#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub success: bool,
    pub end: LoopEnd,
    /// The final assistant text (possibly partial on cancel).
    pub text: String,
    /// Summary produced by auto-compaction this run, if any.
    pub summary: Option<String>,
}

pub struct TurnLoop {
    pub provider: Arc<dyn ModelProvider>,
    pub registry: ToolRegistry,
    pub gate: ApprovalGate,
    pub engine: StreamEngine,
    pub tool_ctx: ToolCtx,
    pub system_prompt: Option<String>,
    pub events: mpsc::Sender<TurnEvent>,
    pub cancel: CancellationToken,
    pub options: TurnLoopOptions,
    /// Summarizer for auto-compaction; absent disables compaction.
    pub compactor: Option<Compactor>,
}

impl TurnLoop {
    pub async fn run(&mut self, log: &mut SessionLog) -> Result<LoopOutcome, KernelError> {
        let session_id = log.session_id().to_string();
        let info = self.provider.info();
        let mut last_text = String::new();
        let mut compact_summary: Option<String> = None;
        // The request view: starts as the log contents, diverges when
        // compaction folds older messages.  The log itself is untouched.
        let mut view: Vec<Message> = log.messages().to_vec();

        for turn in 0..self.options.max_turns {
            if self.cancel.is_cancelled() {
                return Ok(self.finish_canceled(last_text, compact_summary));
            }

            let mut request = CompletionRequest {
                messages: view.clone(),
                tools: self.registry.schemas(),
                system_prompt: self.system_prompt.clone(),
                thinking: info.thinking,
            };

            if self.options.auto_compact {
                if let Some(compactor) = &self.compactor {
                    if should_compact(request.approx_tokens(), info.limits.context) {
                        match compactor.compact(&view, &session_id).await {
                            Ok(Some(result)) => {
                                debug!(
                                    before = view.len(),
                                    after = result.messages.len(),
                                    "auto-compacted request view"
                                );
                                view = result.messages;
                                compact_summary = Some(result.summary);
                                request.messages = view.clone();
                            }
                            Ok(None) => {}
                            Err(e) => warn!(error = %e, "auto-compact failed; sending full view"),
                        }
                    }
                }
            }

            let started = Instant::now();
            let outcome = match self
                .engine
                .run(self.provider.as_ref(), &request, &self.cancel, &self.events)
                .await
            {
                Ok(outcome) => outcome,
                Err(KernelError::Canceled) => {
                    return Ok(self.finish_canceled(last_text, compact_summary));
                }
                Err(e) => return Err(e),
            };

            let assistant = assemble_assistant(&session_id, &outcome);
            let appended = log.append(assistant)?.clone();
            view.push(appended.clone());
            let _ = self.events.send(TurnEvent::Message(appended.clone())).await;
            let _ = self
                .events
                .send(TurnEvent::Turn {
                    usage: outcome.usage,
                    duration_ms: started.elapsed().as_millis() as u64,
                })
                .await;

            if !outcome.text.is_empty() {
                last_text = outcome.text.clone();
            }

            if outcome.tool_calls.is_empty() {
                return Ok(LoopOutcome {
                    success: true,
                    end: LoopEnd::Completed,
                    text: last_text,
                    summary: compact_summary,
                });
            }

            debug!(turn, tools = outcome.tool_calls.len(), "dispatching tool calls");
            let mut canceled_at: Option<usize> = None;
            for (i, call) in outcome.tool_calls.iter().enumerate() {
                if self.cancel.is_cancelled() {
                    canceled_at = Some(i);
                    break;
                }
                let result = self.dispatch_one(call).await;
                let message = Message::tool_result(
                    session_id.as_str(),
                    call.id.as_str(),
                    call.name.as_str(),
                    call.input.clone(),
                    result.clone(),
                );
                let appended = log.append(message)?.clone();
                view.push(appended.clone());
                let _ = self
                    .events
                    .send(TurnEvent::ToolResult {
                        tool_call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        result,
                    })
                    .await;
                let _ = self.events.send(TurnEvent::Message(appended)).await;

                if self.cancel.is_cancelled() {
                    canceled_at = Some(i + 1);
                    break;
                }
            }

            if let Some(from) = canceled_at {
                // Every unanswered tool_use gets the canceled placeholder so
                // the pairing invariant holds on resume.
                for call in &outcome.tool_calls[from..] {
                    let result = ToolResultPayload::err(CANCEL_NOTICE);
                    let message = Message::tool_result(
                        session_id.as_str(),
                        call.id.as_str(),
                        call.name.as_str(),
                        call.input.clone(),
                        result.clone(),
                    );
                    let appended = log.append(message)?.clone();
                    let _ = self
                        .events
                        .send(TurnEvent::ToolResult {
                            tool_call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            result,
                        })
                        .await;
                    let _ = self.events.send(TurnEvent::Message(appended)).await;
                }
                return Ok(self.finish_canceled(last_text, compact_summary));
            }
        }

        Ok(LoopOutcome {
            success: false,
            end: LoopEnd::MaxTurnsExceeded,
            text: last_text,
            summary: compact_summary,
        })
    }

    /// Resolve one tool call: lookup, approval, execution.  Failures of
    /// every kind become error payloads; nothing here unwinds.
    async fn dispatch_one(&self, call: &ToolCallRequest) -> ToolResultPayload {
        let _ = self
            .events
            .send(TurnEvent::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            })
            .await;

        let Some(tool) = self.registry.get(&call.name) else {
            return ToolResultPayload::err(format!("Tool {} not found", call.name));
        };

        if !call.input.is_object() {
            return ToolResultPayload::err(format!(
                "Tool {} requires an object argument, got: {}",
                call.name, call.input
            ));
        }

        let input = match self.gate.resolve(tool.as_ref(), &call.id, call.input.clone()).await {
            ApprovalDecision::Approved { input } => input,
            ApprovalDecision::Denied { message } => {
                return ToolResultPayload::err(message);
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => ToolResultPayload::err(CANCEL_NOTICE),
            result = tool.execute(&self.tool_ctx, input) => result,
        }
    }

    fn finish_canceled(&self, text: String, summary: Option<String>) -> LoopOutcome {
        LoopOutcome {
            success: false,
            end: LoopEnd::Canceled,
            text,
            summary,
        }
    }
}

/// Build the assistant message from a stream outcome: one reasoning part,
/// one text part, one tool_use part per call, in that order.  The message
/// uuid is the engine's request id.
fn assemble_assistant(session_id: &str, outcome: &StreamOutcome) -> Message {
    let mut parts = Vec::new();
    if !outcome.reasoning.is_empty() {
        parts.push(ContentPart::Reasoning {
            text: outcome.reasoning.clone(),
        });
    }
    if !outcome.text.is_empty() {
        parts.push(ContentPart::Text {
            text: outcome.text.clone(),
        });
    }
    for call in &outcome.tool_calls {
        parts.push(ContentPart::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
        });
    }
    let mut message = Message::assistant(session_id, parts);
    message.uuid = outcome.request_id.clone();
    message
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Per-invocation tool authorization.
//!
//! Rules 1–5 are pure and deterministic; only rule 6 suspends, issuing a
//! `toolApproval` request over the bus and waiting for the user.  A user
//! reply may escalate session policy (`approve_always_tool`,
//! `approve_always_edit`) which is persisted to the session sidecar before
//! the call proceeds, and may replace the tool's input.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use quill_bus::MessageBus;
use quill_session::{ApprovalMode, SessionConfig, SessionConfigStore};
use quill_tools::{Tool, ToolCategory};

#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalDecision {
    Approved { input: Value },
    Denied { message: String },
}

/// Rules 1–5: the pure auto-approval decision.  `None` means "ask".
pub fn auto_decision(
    mode: ApprovalMode,
    category: ToolCategory,
    needs_approval: bool,
    session: &SessionConfig,
    tool_name: &str,
) -> Option<bool> {
    if mode == ApprovalMode::Yolo && category != ToolCategory::Ask {
        return Some(true);
    }
    if category == ToolCategory::Read {
        return Some(true);
    }
    if !needs_approval {
        return Some(true);
    }
    if category == ToolCategory::Write
        && (session.approval_mode == ApprovalMode::AutoEdit || mode == ApprovalMode::AutoEdit)
    {
        return Some(true);
    }
    if session.approval_tools.contains(tool_name) {
        return Some(true);
    }
    None
}

pub struct ApprovalGate {
    pub mode: ApprovalMode,
    pub store: SessionConfigStore,
    pub session_id: String,
    pub bus: Option<Arc<MessageBus>>,
    /// Plan mode: every call is approved without asking.
    pub force_approve: bool,
}

impl ApprovalGate {
    pub async fn resolve(
        &self,
        tool: &dyn Tool,
        tool_call_id: &str,
        input: Value,
    ) -> ApprovalDecision {
        if self.force_approve {
            return ApprovalDecision::Approved { input };
        }

        let session = self.store.load(&self.session_id).unwrap_or_default();
        match auto_decision(
            self.mode,
            tool.category(),
            tool.needs_approval(&input),
            &session,
            tool.name(),
        ) {
            Some(true) => return ApprovalDecision::Approved { input },
            Some(false) => unreachable!("auto rules never deny"),
            None => {}
        }

        let Some(bus) = &self.bus else {
            return ApprovalDecision::Denied {
                message: format!(
                    "Tool {} requires approval but no frontend is attached",
                    tool.name()
                ),
            };
        };

        let payload = json!({
            "sessionId": self.session_id,
            "toolName": tool.name(),
            "toolCallId": tool_call_id,
            "input": input,
            "category": tool.category(),
        });
        let reply = match bus.request("toolApproval", payload).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, tool = tool.name(), "tool approval round-trip failed");
                return ApprovalDecision::Denied {
                    message: format!("Approval request failed: {e}"),
                };
            }
        };

        let behavior = reply
            .get("behavior")
            .and_then(|v| v.as_str())
            .unwrap_or("deny");
        let updated_input = reply.get("updatedInput").cloned();

        match behavior {
            "approve" | "approve_always_tool" | "approve_always_edit" => {
                if behavior == "approve_always_tool" {
                    let name = tool.name().to_string();
                    if let Err(e) = self.store.update(&self.session_id, |c| {
                        c.approval_tools.insert(name);
                    }) {
                        warn!(error = %e, "failed to persist approve_always_tool");
                    }
                }
                if behavior == "approve_always_edit" {
                    if let Err(e) = self.store.update(&self.session_id, |c| {
                        c.approval_mode = ApprovalMode::AutoEdit;
                    }) {
                        warn!(error = %e, "failed to persist approve_always_edit");
                    }
                }
                ApprovalDecision::Approved {
                    input: updated_input.unwrap_or(input),
                }
            }
            _ => ApprovalDecision::Denied {
                message: format!("User denied {} invocation", tool.name()),
            },
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

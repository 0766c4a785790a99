// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Request-view compaction.  When the projected prompt outgrows the model's
//! context budget, everything before the recent tail is summarized by a
//! small model into one synthetic note that replaces those messages in the
//! request.  The session log is never touched.

use std::sync::Arc;

use futures::StreamExt;
use tracing::warn;

use quill_model::{CompletionRequest, Message, ModelProvider, ResponseEvent, Role};

/// Fraction of the context window that triggers compaction.
const TRIGGER_FRACTION: f64 = 0.8;
/// Floor for models without catalog entries, matching a conservative
/// small-model budget.
const MIN_TOKEN_THRESHOLD: usize = (32_000.0 * 0.8) as usize;

/// Number of trailing user turns preserved verbatim.
const KEEP_RECENT_TURNS: usize = 5;

const SUMMARIZE_PROMPT: &str =
    "You are a context compaction assistant. Summarize the conversation below in a \
     concise, information-dense way. Preserve technical details, decisions, file \
     names, code snippets, and tool outputs relevant to future work. The summary \
     replaces the original history.";

/// True when `projected_tokens` exceeds the compaction threshold for a
/// model with `context_limit` tokens.  A zero limit (unknown model) falls
/// back to the small-model floor.
pub fn should_compact(projected_tokens: usize, context_limit: u32) -> bool {
    let budget = if context_limit == 0 {
        MIN_TOKEN_THRESHOLD
    } else {
        ((context_limit as f64) * TRIGGER_FRACTION) as usize
    };
    projected_tokens >= budget
}

pub struct Compactor {
    /// The summarizer, typically the configured small model.
    pub provider: Arc<dyn ModelProvider>,
}

pub struct CompactionResult {
    /// The replacement request view: summary note + preserved tail.
    pub messages: Vec<Message>,
    /// The summary text, persisted to the session sidecar for UI titles.
    pub summary: String,
}

impl Compactor {
    /// Summarize everything before the last [`KEEP_RECENT_TURNS`] user
    /// turns.  Returns `None` when there is nothing old enough to fold.
    pub async fn compact(
        &self,
        messages: &[Message],
        session_id: &str,
    ) -> anyhow::Result<Option<CompactionResult>> {
        let split = split_point(messages);
        if split == 0 {
            return Ok(None);
        }
        let (old, recent) = messages.split_at(split);

        let history = render_history(old);
        let request = CompletionRequest {
            messages: vec![Message::user(
                session_id,
                format!("{SUMMARIZE_PROMPT}\n\n---\n\n{history}"),
            )],
            ..Default::default()
        };

        let mut stream = self
            .provider
            .complete(request)
            .await
            .map_err(|e| anyhow::anyhow!("compaction model call failed: {e}"))?;
        let mut summary = String::new();
        while let Some(event) = stream.next().await {
            match event {
                Ok(ResponseEvent::TextDelta(d)) => summary.push_str(&d),
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "compaction stream error");
                    break;
                }
            }
        }
        if summary.trim().is_empty() {
            return Ok(None);
        }

        let mut view = Vec::with_capacity(recent.len() + 1);
        let note = Message::system(
            session_id,
            format!("Summary of the earlier conversation:\n\n{}", summary.trim()),
        );
        view.push(note);
        view.extend_from_slice(recent);
        Ok(Some(CompactionResult {
            messages: view,
            summary: summary.trim().to_string(),
        }))
    }
}

/// Index of the first message to keep verbatim.
///
/// Walks backward past [`KEEP_RECENT_TURNS`] user turns, then moves further
/// backward while the split would land inside a tool-use/tool-result group:
/// a tail starting with orphaned tool results references call ids that were
/// summarized away, which providers reject.
fn split_point(messages: &[Message]) -> usize {
    let mut user_turns = 0;
    let mut split = messages.len();
    for (i, m) in messages.iter().enumerate().rev() {
        if m.role == Role::User {
            user_turns += 1;
            if user_turns >= KEEP_RECENT_TURNS {
                split = i;
                break;
            }
        }
        if i == 0 {
            return 0;
        }
    }
    if split == messages.len() {
        return 0;
    }
    while split > 0 && messages[split].role == Role::Tool {
        split -= 1;
    }
    split
}

fn render_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            let mut body = m.text();
            for (id, name, input) in m.tool_uses() {
                body.push_str(&format!("\n[tool_use {name} {id}: {input}]"));
            }
            for id in m.tool_result_ids() {
                body.push_str(&format!("\n[tool_result {id}]"));
            }
            format!("{role}: {body}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

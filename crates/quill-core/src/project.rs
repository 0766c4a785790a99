// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Binds a working directory + session id + context to the turn loop and
//! exposes the two frontend entrypoints, `send` and `plan`.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use quill_model::{ContentPart, Message, ModelProvider, Role};
use quill_session::SessionLog;
use quill_tools::{resolve_tools, QuestionHandle, ToolCtx, ToolsetOptions, UserQuestion};

use crate::approval::ApprovalGate;
use crate::atpath;
use crate::compact::Compactor;
use crate::context::Context;
use crate::error::KernelError;
use crate::events::TurnEvent;
use crate::plugin::HookKind;
use crate::prompt::{self, PromptParams};
use crate::stream::StreamEngine;
use crate::turn::{LoopEnd, TurnLoop, TurnLoopOptions};

/// Inline attachment carried with a user prompt.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub data: String,
    pub mime_type: String,
    pub filename: Option<String>,
}

#[derive(Default)]
pub struct SendOptions {
    /// Explicit model override, `provider/model`.
    pub model: Option<String>,
    pub attachments: Vec<Attachment>,
    /// Quiet sends get a read-only toolset and no todo/ask tools.
    pub quiet: bool,
    /// Direct provider injection; bypasses model resolution.  Used by
    /// tests and embedding applications.
    pub provider: Option<Arc<dyn ModelProvider>>,
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub success: bool,
    pub end: LoopEnd,
    pub text: String,
    pub session_id: String,
}

pub struct ProjectSession {
    ctx: Arc<Context>,
    session_id: String,
}

impl ProjectSession {
    pub fn new(ctx: Arc<Context>, session_id: impl Into<String>) -> Self {
        Self {
            ctx,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Normal chat entrypoint.
    pub async fn send(
        &self,
        prompt_text: &str,
        opts: SendOptions,
        cancel: CancellationToken,
    ) -> Result<SendOutcome, KernelError> {
        self.run(prompt_text, opts, cancel, false).await
    }

    /// Plan mode: read-only toolset, forced approvals, plan model.
    pub async fn plan(
        &self,
        prompt_text: &str,
        opts: SendOptions,
        cancel: CancellationToken,
    ) -> Result<SendOutcome, KernelError> {
        self.run(prompt_text, opts, cancel, true).await
    }

    async fn run(
        &self,
        prompt_text: &str,
        opts: SendOptions,
        cancel: CancellationToken,
        plan_mode: bool,
    ) -> Result<SendOutcome, KernelError> {
        let ctx = &self.ctx;
        let session_id = self.session_id.clone();

        // One writer per session: a second send while one is running is
        // rejected; the client queues.
        let lock = ctx.session_lock(&session_id).await;
        let _guard = lock
            .clone()
            .try_lock_owned()
            .map_err(|_| KernelError::SessionBusy(session_id.clone()))?;

        let mut log = SessionLog::open(&ctx.paths.sessions_dir, &session_id)?;
        let session_cfg = ctx.session_store.load(&session_id).unwrap_or_default();

        // Toolset: write+todo+ask unless quiet; plan mode is read-only.
        let read_only = opts.quiet || plan_mode;
        ctx.mcp.init_async().await;
        let mcp_tools = if read_only { Vec::new() } else { ctx.mcp.tools().await };
        let toolset = ToolsetOptions {
            write_enabled: !read_only,
            todo_enabled: !read_only,
            ask_enabled: !read_only,
            bash_timeout_secs: ctx.config.bash_timeout_secs,
        };
        let registry = resolve_tools(&toolset, &ctx.config.tools, mcp_tools)
            .map_err(KernelError::Internal)?;

        // Hook `tool` lets plugins veto or observe the resolved toolset.
        let tool_names = registry.names();
        ctx.plugins
            .apply(
                "tool",
                &json!({"sessionId": session_id, "tools": tool_names}),
                None,
                HookKind::Parallel,
            )
            .await?;

        // System prompt: template → plugin fold.
        let project_context = discover_project_context(&ctx.cwd, &session_cfg.additional_directories);
        let cwd_display = ctx.cwd.display().to_string();
        let params = PromptParams {
            product_name: &ctx.product_name,
            cwd: &cwd_display,
            output_style: ctx.config.output_style.as_deref(),
            language: ctx.config.language.as_deref(),
            tool_names: &tool_names,
            project_context: project_context.as_deref(),
        };
        let base_prompt = if plan_mode {
            prompt::plan_system_prompt(&params)
        } else {
            prompt::system_prompt(&params)
        };
        let system_prompt = ctx
            .plugins
            .apply_text("system_prompt", &json!({"sessionId": session_id}), base_prompt)
            .await?;

        // User prompt: plugin fold → @path expansion → message parts.
        let mut user_text = ctx
            .plugins
            .apply_text(
                "user_prompt",
                &json!({"sessionId": session_id}),
                prompt_text.to_string(),
            )
            .await?;
        if let Some(block) = atpath::expand_prompt_context(&ctx.cwd, &user_text) {
            user_text = format!("{user_text}\n\n{block}");
        }
        let mut parts = vec![ContentPart::text(user_text)];
        for attachment in &opts.attachments {
            if attachment.mime_type.starts_with("image/") {
                parts.push(ContentPart::Image {
                    data: attachment.data.clone(),
                    mime_type: attachment.mime_type.clone(),
                });
            } else {
                parts.push(ContentPart::File {
                    filename: attachment.filename.clone(),
                    data: attachment.data.clone(),
                    mime_type: attachment.mime_type.clone(),
                });
            }
        }
        let user_message = log
            .append(Message::new(Role::User, session_id.as_str(), parts))?
            .clone();

        if let Err(e) = ctx.global_data.record_prompt(&cwd_display, prompt_text) {
            warn!(error = %e, "failed to record prompt history");
        }

        // Model resolution: injected > explicit option > session override >
        // vision model when history carries images > config default > mock.
        let provider = match opts.provider.clone() {
            Some(p) => p,
            None => {
                let spec = self.resolve_model_spec(&opts, &session_cfg, log.messages(), plan_mode);
                ctx.resolve_provider(&spec).map_err(|e| {
                    KernelError::ConfigInvalid(format!("cannot resolve model '{spec}': {e}"))
                })?
            }
        };

        // Compaction summarizer: the configured small model, else the
        // conversation model itself.
        let compactor = if ctx.config.auto_compact {
            let summarizer = ctx
                .config
                .model
                .small
                .as_deref()
                .and_then(|spec| ctx.resolve_provider(spec).ok())
                .unwrap_or_else(|| Arc::clone(&provider));
            Some(Compactor {
                provider: summarizer,
            })
        } else {
            None
        };

        let gate = ApprovalGate {
            mode: ctx.config.approval_mode,
            store: ctx.session_store.clone(),
            session_id: session_id.clone(),
            bus: ctx.bus.clone(),
            force_approve: plan_mode,
        };

        let tool_ctx = ToolCtx {
            cwd: ctx.cwd.clone(),
            session_id: session_id.clone(),
            cancel: cancel.clone(),
            todos: ctx.session_todos(&session_id).await,
            background: Arc::clone(&ctx.background),
            questions: self.question_handle(),
        };

        let (events_tx, events_rx) = tokio::sync::mpsc::channel(256);
        let forwarder = tokio::spawn(forward_events(
            events_rx,
            Arc::clone(ctx),
            session_id.clone(),
        ));
        // The user message event goes through the same pipe so frontends
        // see one ordered stream.
        let _ = events_tx.send(TurnEvent::Message(user_message)).await;

        let mut turn_loop = TurnLoop {
            provider,
            registry,
            gate,
            engine: StreamEngine {
                max_retries: 3,
                request_log_dir: Some(ctx.paths.request_logs_dir.clone()),
            },
            tool_ctx,
            system_prompt: Some(system_prompt),
            events: events_tx,
            cancel,
            options: TurnLoopOptions {
                max_turns: ctx.config.max_turns,
                auto_compact: ctx.config.auto_compact,
            },
            compactor,
        };
        let outcome = turn_loop.run(&mut log).await;
        drop(turn_loop);
        let _ = forwarder.await;

        let outcome = outcome?;
        if let Some(summary) = &outcome.summary {
            let summary = summary.clone();
            if let Err(e) = ctx.session_store.update(&session_id, move |c| {
                c.summary = Some(summary);
            }) {
                warn!(error = %e, "failed to persist compaction summary");
            }
        }

        Ok(SendOutcome {
            success: outcome.success,
            end: outcome.end,
            text: outcome.text,
            session_id,
        })
    }

    fn resolve_model_spec(
        &self,
        opts: &SendOptions,
        session_cfg: &quill_session::SessionConfig,
        history: &[Message],
        plan_mode: bool,
    ) -> String {
        let cfg = &self.ctx.config.model;
        if plan_mode {
            if let Some(plan) = &cfg.plan {
                return plan.clone();
            }
        }
        if let Some(model) = &opts.model {
            return model.clone();
        }
        if let Some(model) = &session_cfg.model {
            return model.clone();
        }
        let has_images = history.iter().any(|m| m.has_images());
        if has_images {
            if let Some(vision) = &cfg.vision {
                return vision.clone();
            }
        }
        cfg.default
            .clone()
            .unwrap_or_else(|| "mock/mock-model".to_string())
    }

    /// Bus-backed question round-trip for ask-category tools.
    fn question_handle(&self) -> Option<QuestionHandle> {
        let bus = self.ctx.bus.clone()?;
        let session_id = self.session_id.clone();
        let handle: QuestionHandle = Arc::new(move |questions: Vec<UserQuestion>| {
            let bus = Arc::clone(&bus);
            let session_id = session_id.clone();
            Box::pin(async move {
                let payload = json!({
                    "sessionId": session_id,
                    "questions": questions,
                });
                let reply = bus
                    .request("userQuestion", payload)
                    .await
                    .map_err(|e| anyhow::anyhow!("question round-trip failed: {e}"))?;
                Ok(reply
                    .get("answer")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string())
            }) as BoxFuture<'static, anyhow::Result<String>>
        });
        Some(handle)
    }
}

/// Forward loop events to bus topics and plugin hooks.
async fn forward_events(
    mut rx: tokio::sync::mpsc::Receiver<TurnEvent>,
    ctx: Arc<Context>,
    session_id: String,
) {
    while let Some(event) = rx.recv().await {
        let Some(bus) = &ctx.bus else { continue };
        match event {
            TurnEvent::Message(message) => {
                let payload = json!({"sessionId": session_id, "message": message});
                bus.emit_event("session.message", payload).await;
            }
            TurnEvent::TextDelta { uuid, delta } => {
                bus.emit_event(
                    "session.textDelta",
                    json!({"sessionId": session_id, "uuid": uuid, "delta": delta}),
                )
                .await;
            }
            TurnEvent::ReasoningDelta { uuid, delta } => {
                bus.emit_event(
                    "session.reasoningDelta",
                    json!({"sessionId": session_id, "uuid": uuid, "delta": delta}),
                )
                .await;
            }
            TurnEvent::ToolUse { id, name, input } => {
                let payload = json!({
                    "sessionId": session_id, "toolCallId": id, "toolName": name, "input": input,
                });
                let _ = ctx
                    .plugins
                    .apply("tool_use", &payload, None, HookKind::Parallel)
                    .await;
                bus.emit_event("session.toolUse", payload).await;
            }
            TurnEvent::ToolResult {
                tool_call_id,
                tool_name,
                result,
            } => {
                let payload = json!({
                    "sessionId": session_id,
                    "toolCallId": tool_call_id,
                    "toolName": tool_name,
                    "result": result,
                });
                let _ = ctx
                    .plugins
                    .apply("tool_result", &payload, None, HookKind::Parallel)
                    .await;
                bus.emit_event("session.toolResult", payload).await;
            }
            TurnEvent::StreamResult(attempt) => {
                bus.emit_event(
                    "session.streamResult",
                    json!({
                        "sessionId": session_id,
                        "requestId": attempt.request_id,
                        "model": attempt.model,
                        "retryAttempt": attempt.retry_attempt,
                        "maxRetries": attempt.max_retries,
                        "error": attempt.error,
                    }),
                )
                .await;
            }
            TurnEvent::Turn { usage, duration_ms } => {
                bus.emit_event(
                    "session.turn",
                    json!({
                        "sessionId": session_id,
                        "usage": {"input": usage.input_tokens, "output": usage.output_tokens},
                        "durationMs": duration_ms,
                    }),
                )
                .await;
            }
        }
    }
}

/// AGENTS.md discovery: walk cwd up to the filesystem root, closest first,
/// then any configured additional directories.
fn discover_project_context(cwd: &Path, additional: &[String]) -> Option<String> {
    const PER_FILE_CAP: usize = 16 * 1024;

    let mut sections = Vec::new();
    let mut dir = Some(cwd);
    while let Some(d) = dir {
        let candidate = d.join("AGENTS.md");
        if let Ok(mut text) = std::fs::read_to_string(&candidate) {
            if text.len() > PER_FILE_CAP {
                text.truncate(PER_FILE_CAP);
                text.push_str("\n... [truncated]");
            }
            sections.push(format!("# {}\n{}", candidate.display(), text));
        }
        dir = d.parent();
    }
    for extra in additional {
        let candidate = Path::new(extra).join("AGENTS.md");
        if let Ok(mut text) = std::fs::read_to_string(&candidate) {
            if text.len() > PER_FILE_CAP {
                text.truncate(PER_FILE_CAP);
                text.push_str("\n... [truncated]");
            }
            sections.push(format!("# {}\n{}", candidate.display(), text));
        }
    }
    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

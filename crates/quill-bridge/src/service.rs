// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Registers every bus method a frontend may call and maps each onto the
//! kernel operations.  Handlers are stateless apart from two caches: the
//! lazy `cwd → Context` map and the per-`(cwd, session)` cancel tokens.
//!
//! Every handler catches its own failures and answers with the
//! success/error envelope; nothing unwinds across the bus boundary.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use quill_bus::MessageBus;
use quill_core::atpath;
use quill_core::context::{Context, ContextOptions, ProviderFactory};
use quill_core::project::{Attachment, ProjectSession, SendOptions};
use quill_core::prompt::output_styles;
use quill_core::turn::{LoopEnd, CANCEL_NOTICE};
use quill_model::catalog::static_catalog;
use quill_model::{Message, ToolResultPayload};
use quill_session::{find_incomplete_tool_uses, SessionLog};

use crate::protocol::{
    envelope_err, envelope_ok, BackgroundTaskParams, CwdParams, ExpandPathsParams, McpRetryParams,
    SendParams, SessionConfigSetParams, SessionParams,
};

const SLASH_COMMANDS: &[(&str, &str)] = &[
    ("compact", "Fold older history into a summary"),
    ("plan", "Produce a reviewable plan without modifying anything"),
    ("fork", "Continue from an earlier message"),
];

pub struct NodeBridge {
    bus: Arc<MessageBus>,
    product_name: String,
    data_root: Option<PathBuf>,
    provider_factory: Option<Arc<dyn ProviderFactory>>,
    contexts: Mutex<HashMap<PathBuf, Arc<Context>>>,
    cancels: Mutex<HashMap<(String, String), CancellationToken>>,
}

impl NodeBridge {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            bus,
            product_name: "quill".to_string(),
            data_root: None,
            provider_factory: None,
            contexts: Mutex::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = name.into();
        self
    }

    pub fn with_data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_root = Some(root.into());
        self
    }

    pub fn with_provider_factory(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.provider_factory = Some(factory);
        self
    }

    /// Wire every handler onto the bus and return the shared bridge.
    pub fn register(self) -> Arc<Self> {
        let bridge = Arc::new(self);

        route(&bridge, "status.get", Self::status_get);
        route(&bridge, "models.list", Self::models_list);
        route(&bridge, "providers.list", Self::providers_list);
        route(&bridge, "outputStyles.list", Self::output_styles_list);
        route(&bridge, "slashCommand.list", Self::slash_command_list);
        route(&bridge, "config.get", Self::config_get);
        route(&bridge, "config.set", Self::config_set);
        route(&bridge, "project.history", Self::project_history);
        route(&bridge, "mcp.status", Self::mcp_status);
        route(&bridge, "mcp.retry", Self::mcp_retry);
        route(&bridge, "sessions.list", Self::sessions_list);
        route(&bridge, "session.send", Self::session_send);
        route(&bridge, "session.cancel", Self::session_cancel);
        route(&bridge, "session.messages.list", Self::session_messages_list);
        route(&bridge, "session.config.get", Self::session_config_get);
        route(&bridge, "session.config.set", Self::session_config_set);
        route(&bridge, "background.list", Self::background_list);
        route(&bridge, "background.output", Self::background_output);
        route(&bridge, "background.kill", Self::background_kill);
        route(&bridge, "utils.expandPaths", Self::utils_expand_paths);
        route(&bridge, "workspace.exit", Self::workspace_exit);

        bridge
    }

    async fn context_for(&self, cwd: &str) -> anyhow::Result<Arc<Context>> {
        let key = PathBuf::from(cwd);
        let mut contexts = self.contexts.lock().await;
        if let Some(ctx) = contexts.get(&key) {
            return Ok(Arc::clone(ctx));
        }
        let mut opts = ContextOptions::new(&key);
        opts.product_name = self.product_name.clone();
        opts.bus = Some(Arc::clone(&self.bus));
        opts.data_root = self.data_root.clone();
        opts.provider_factory = self.provider_factory.clone();
        let ctx = Context::create(opts).await?;
        contexts.insert(key, Arc::clone(&ctx));
        Ok(ctx)
    }

    // ── Static catalogs ───────────────────────────────────────────────────

    async fn status_get(self: Arc<Self>, _payload: Value) -> Value {
        let contexts = self.contexts.lock().await.len();
        let in_flight = self.cancels.lock().await.len();
        envelope_ok(json!({
            "product": self.product_name,
            "version": env!("CARGO_PKG_VERSION"),
            "activeContexts": contexts,
            "inFlightSends": in_flight,
        }))
    }

    async fn models_list(self: Arc<Self>, _payload: Value) -> Value {
        let models: Vec<Value> = static_catalog()
            .into_iter()
            .map(|m| {
                json!({
                    "providerId": m.provider_id,
                    "modelId": m.model_id,
                    "limits": {"context": m.limits.context, "output": m.limits.output},
                    "capabilities": {
                        "reasoning": m.capabilities.reasoning,
                        "attachment": m.capabilities.attachment,
                        "toolCall": m.capabilities.tool_call,
                        "temperature": m.capabilities.temperature,
                    },
                })
            })
            .collect();
        envelope_ok(json!(models))
    }

    async fn providers_list(self: Arc<Self>, _payload: Value) -> Value {
        let mut providers: Vec<String> = static_catalog()
            .into_iter()
            .map(|m| m.provider_id)
            .collect();
        providers.sort();
        providers.dedup();
        envelope_ok(json!(providers))
    }

    async fn output_styles_list(self: Arc<Self>, _payload: Value) -> Value {
        let styles: Vec<Value> = output_styles()
            .iter()
            .map(|s| json!({"name": s.name, "description": s.description}))
            .collect();
        envelope_ok(json!(styles))
    }

    async fn slash_command_list(self: Arc<Self>, _payload: Value) -> Value {
        let commands: Vec<Value> = SLASH_COMMANDS
            .iter()
            .map(|(name, description)| json!({"name": name, "description": description}))
            .collect();
        envelope_ok(json!(commands))
    }

    // ── Config ────────────────────────────────────────────────────────────

    async fn config_get(self: Arc<Self>, payload: Value) -> Value {
        let params: CwdParams = match parse(payload) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match self.context_for(&params.cwd).await {
            Ok(ctx) => match serde_json::to_value(&ctx.config) {
                Ok(config) => envelope_ok(config),
                Err(e) => envelope_err(e.to_string(), Some("internal")),
            },
            Err(e) => envelope_err(e.to_string(), Some("config_invalid")),
        }
    }

    /// Shallow-merge a patch into the global config file, then drop the
    /// cached context so the next operation reloads.
    async fn config_set(self: Arc<Self>, payload: Value) -> Value {
        let cwd = match payload.get("cwd").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return envelope_err("missing cwd", Some("config_invalid")),
        };
        let Some(patch) = payload.get("patch").cloned() else {
            return envelope_err("missing patch", Some("config_invalid"));
        };
        let ctx = match self.context_for(&cwd).await {
            Ok(ctx) => ctx,
            Err(e) => return envelope_err(e.to_string(), Some("config_invalid")),
        };
        let path = ctx.paths.global_dir.join("config.yaml");
        let mut current: Value = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_yaml::from_str(&text).ok())
            .unwrap_or_else(|| json!({}));
        if let (Value::Object(dst), Value::Object(src)) = (&mut current, patch) {
            for (k, v) in src {
                dst.insert(k, v);
            }
        }
        let yaml = match serde_yaml::to_string(&current) {
            Ok(y) => y,
            Err(e) => return envelope_err(e.to_string(), Some("config_invalid")),
        };
        if let Err(e) = std::fs::create_dir_all(&ctx.paths.global_dir)
            .and_then(|_| std::fs::write(&path, yaml))
        {
            return envelope_err(e.to_string(), Some("config_invalid"));
        }
        // Invalidate so the next call observes the new config.
        self.contexts.lock().await.remove(&PathBuf::from(&cwd));
        envelope_ok(json!({"written": path.display().to_string()}))
    }

    async fn project_history(self: Arc<Self>, payload: Value) -> Value {
        let params: CwdParams = match parse(payload) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match self.context_for(&params.cwd).await {
            Ok(ctx) => match ctx.global_data.project_history(&params.cwd) {
                Ok(history) => envelope_ok(json!(history)),
                Err(e) => envelope_err(e.to_string(), Some("internal")),
            },
            Err(e) => envelope_err(e.to_string(), Some("config_invalid")),
        }
    }

    // ── MCP ───────────────────────────────────────────────────────────────

    async fn mcp_status(self: Arc<Self>, payload: Value) -> Value {
        let params: CwdParams = match parse(payload) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match self.context_for(&params.cwd).await {
            Ok(ctx) => {
                ctx.mcp.init_async().await;
                let statuses = ctx.mcp.statuses().await;
                envelope_ok(serde_json::to_value(statuses).unwrap_or_else(|_| json!({})))
            }
            Err(e) => envelope_err(e.to_string(), Some("config_invalid")),
        }
    }

    async fn mcp_retry(self: Arc<Self>, payload: Value) -> Value {
        let params: McpRetryParams = match parse(payload) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let ctx = match self.context_for(&params.cwd).await {
            Ok(ctx) => ctx,
            Err(e) => return envelope_err(e.to_string(), Some("config_invalid")),
        };
        ctx.mcp.init_async().await;
        match ctx.mcp.retry_connection(&params.server).await {
            Ok(report) => envelope_ok(serde_json::to_value(report).unwrap_or_default()),
            Err(e) => envelope_err(e.to_string(), Some("mcp_connection")),
        }
    }

    // ── Sessions ──────────────────────────────────────────────────────────

    async fn sessions_list(self: Arc<Self>, payload: Value) -> Value {
        let params: CwdParams = match parse(payload) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let ctx = match self.context_for(&params.cwd).await {
            Ok(ctx) => ctx,
            Err(e) => return envelope_err(e.to_string(), Some("config_invalid")),
        };
        let mut ids: Vec<String> = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&ctx.paths.sessions_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        ids.push(stem.to_string());
                    }
                }
            }
        }
        ids.sort();
        let sessions: Vec<Value> = ids
            .into_iter()
            .map(|id| {
                let summary = ctx
                    .session_store
                    .load(&id)
                    .ok()
                    .and_then(|c| c.summary);
                json!({"sessionId": id, "summary": summary})
            })
            .collect();
        envelope_ok(json!(sessions))
    }

    async fn session_send(self: Arc<Self>, payload: Value) -> Value {
        let params: SendParams = match parse(payload) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let ctx = match self.context_for(&params.cwd).await {
            Ok(ctx) => ctx,
            Err(e) => return envelope_err(e.to_string(), Some("config_invalid")),
        };
        let session_id = params
            .session_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let token = CancellationToken::new();
        {
            let mut cancels = self.cancels.lock().await;
            cancels.insert((params.cwd.clone(), session_id.clone()), token.clone());
        }

        let project = ProjectSession::new(Arc::clone(&ctx), session_id.clone());
        let opts = SendOptions {
            model: params.model,
            attachments: params
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    data: a.data,
                    mime_type: a.mime_type,
                    filename: a.filename,
                })
                .collect(),
            quiet: false,
            provider: None,
        };
        let result = if params.plan_mode {
            project.plan(&params.message, opts, token.clone()).await
        } else {
            project.send(&params.message, opts, token.clone()).await
        };

        self.cancels
            .lock()
            .await
            .remove(&(params.cwd.clone(), session_id.clone()));

        match result {
            Ok(outcome) if outcome.success => envelope_ok(json!({
                "sessionId": outcome.session_id,
                "text": outcome.text,
                "type": end_tag(outcome.end),
            })),
            Ok(outcome) => json!({
                "success": false,
                "error": {
                    "message": format!("send ended without success: {}", end_tag(outcome.end)),
                    "type": end_tag(outcome.end),
                },
                "data": {"sessionId": outcome.session_id, "text": outcome.text},
            }),
            Err(e) => envelope_err(e.to_string(), Some(e.kind())),
        }
    }

    /// Cancel the in-flight send, then restore the pairing invariant: every
    /// unanswered tool_use in the log gets a synthetic interrupted result.
    /// Taking the session lock first means the housekeeping runs strictly
    /// after the loop has wound down.
    async fn session_cancel(self: Arc<Self>, payload: Value) -> Value {
        let params: SessionParams = match parse(payload) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let token = {
            let cancels = self.cancels.lock().await;
            cancels
                .get(&(params.cwd.clone(), params.session_id.clone()))
                .cloned()
        };
        let had_token = token.is_some();
        if let Some(token) = token {
            token.cancel();
        }

        let ctx = match self.context_for(&params.cwd).await {
            Ok(ctx) => ctx,
            Err(e) => return envelope_err(e.to_string(), Some("config_invalid")),
        };
        let lock = ctx.session_lock(&params.session_id).await;
        let _guard = lock.lock().await;

        let mut synthesized = 0usize;
        match SessionLog::open(&ctx.paths.sessions_dir, &params.session_id) {
            Ok(mut log) => {
                if let Some(incomplete) = find_incomplete_tool_uses(log.messages()) {
                    for (id, name, input) in incomplete.pending {
                        let message = Message::tool_result(
                            params.session_id.as_str(),
                            id,
                            name,
                            input,
                            ToolResultPayload::err(CANCEL_NOTICE),
                        );
                        if let Err(e) = log.append(message) {
                            warn!(error = %e, "failed to append canceled tool result");
                            break;
                        }
                        synthesized += 1;
                    }
                }
            }
            Err(e) => {
                return envelope_err(e.to_string(), Some("internal"));
            }
        }
        debug!(session = %params.session_id, had_token, synthesized, "session canceled");
        envelope_ok(json!({"canceled": had_token, "synthesizedResults": synthesized}))
    }

    async fn session_messages_list(self: Arc<Self>, payload: Value) -> Value {
        let params: SessionParams = match parse(payload) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let ctx = match self.context_for(&params.cwd).await {
            Ok(ctx) => ctx,
            Err(e) => return envelope_err(e.to_string(), Some("config_invalid")),
        };
        let path = ctx
            .paths
            .sessions_dir
            .join(format!("{}.jsonl", params.session_id));
        if !path.is_file() {
            return envelope_ok(json!([]));
        }
        match SessionLog::load(&path) {
            Ok(messages) => {
                envelope_ok(serde_json::to_value(messages).unwrap_or_else(|_| json!([])))
            }
            Err(e) => envelope_err(e.to_string(), Some("internal")),
        }
    }

    async fn session_config_get(self: Arc<Self>, payload: Value) -> Value {
        let params: SessionParams = match parse(payload) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let ctx = match self.context_for(&params.cwd).await {
            Ok(ctx) => ctx,
            Err(e) => return envelope_err(e.to_string(), Some("config_invalid")),
        };
        match ctx.session_store.load(&params.session_id) {
            Ok(config) => envelope_ok(serde_json::to_value(config).unwrap_or_default()),
            Err(e) => envelope_err(e.to_string(), Some("internal")),
        }
    }

    async fn session_config_set(self: Arc<Self>, payload: Value) -> Value {
        let params: SessionConfigSetParams = match parse(payload) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let ctx = match self.context_for(&params.cwd).await {
            Ok(ctx) => ctx,
            Err(e) => return envelope_err(e.to_string(), Some("config_invalid")),
        };
        let current = match ctx.session_store.load(&params.session_id) {
            Ok(c) => c,
            Err(e) => return envelope_err(e.to_string(), Some("internal")),
        };
        let mut merged = match serde_json::to_value(current) {
            Ok(v) => v,
            Err(e) => return envelope_err(e.to_string(), Some("internal")),
        };
        if let (Value::Object(dst), Value::Object(src)) = (&mut merged, params.patch) {
            for (k, v) in src {
                dst.insert(k, v);
            }
        }
        let updated: quill_session::SessionConfig = match serde_json::from_value(merged) {
            Ok(c) => c,
            Err(e) => {
                return envelope_err(format!("invalid session config: {e}"), Some("config_invalid"))
            }
        };
        match ctx.session_store.save(&params.session_id, &updated) {
            Ok(()) => envelope_ok(serde_json::to_value(updated).unwrap_or_default()),
            Err(e) => envelope_err(e.to_string(), Some("internal")),
        }
    }

    // ── Background tasks ──────────────────────────────────────────────────

    async fn background_list(self: Arc<Self>, payload: Value) -> Value {
        let params: CwdParams = match parse(payload) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match self.context_for(&params.cwd).await {
            Ok(ctx) => {
                envelope_ok(serde_json::to_value(ctx.background.list().await).unwrap_or_default())
            }
            Err(e) => envelope_err(e.to_string(), Some("config_invalid")),
        }
    }

    async fn background_output(self: Arc<Self>, payload: Value) -> Value {
        let params: BackgroundTaskParams = match parse(payload) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match self.context_for(&params.cwd).await {
            Ok(ctx) => match ctx.background.output(&params.task_id).await {
                Some((output, done)) => envelope_ok(json!({"output": output, "done": done})),
                None => envelope_err(format!("unknown task: {}", params.task_id), None),
            },
            Err(e) => envelope_err(e.to_string(), Some("config_invalid")),
        }
    }

    async fn background_kill(self: Arc<Self>, payload: Value) -> Value {
        let params: BackgroundTaskParams = match parse(payload) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match self.context_for(&params.cwd).await {
            Ok(ctx) => {
                let killed = ctx.background.kill(&params.task_id).await;
                envelope_ok(json!({"killed": killed}))
            }
            Err(e) => envelope_err(e.to_string(), Some("config_invalid")),
        }
    }

    // ── Utilities ─────────────────────────────────────────────────────────

    async fn utils_expand_paths(self: Arc<Self>, payload: Value) -> Value {
        let params: ExpandPathsParams = match parse(payload) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let refs: Vec<Value> = atpath::extract_at_paths(&params.prompt)
            .into_iter()
            .map(|r| {
                json!({
                    "path": r.path,
                    "range": r.range.map(|lr| json!({"start": lr.start, "end": lr.end})),
                })
            })
            .collect();
        let block = atpath::expand_prompt_context(std::path::Path::new(&params.cwd), &params.prompt);
        envelope_ok(json!({"refs": refs, "block": block}))
    }

    async fn workspace_exit(self: Arc<Self>, _payload: Value) -> Value {
        let contexts: Vec<Arc<Context>> = {
            let mut map = self.contexts.lock().await;
            map.drain().map(|(_, ctx)| ctx).collect()
        };
        for ctx in contexts {
            ctx.destroy().await;
        }
        envelope_ok(json!({"exited": true}))
    }
}

fn end_tag(end: LoopEnd) -> &'static str {
    match end {
        LoopEnd::Completed => "completed",
        LoopEnd::Canceled => "canceled",
        LoopEnd::MaxTurnsExceeded => "max_turns_exceeded",
    }
}

fn parse<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, Value> {
    serde_json::from_value(payload)
        .map_err(|e| envelope_err(format!("invalid params: {e}"), Some("config_invalid")))
}

/// Register one handler, cloning the bridge into the closure.  Handlers
/// never return the bus-level error variant: failures ride in the
/// success/error envelope.
fn route<F, Fut>(bridge: &Arc<NodeBridge>, method: &str, f: F)
where
    F: Fn(Arc<NodeBridge>, Value) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Value> + Send + 'static,
{
    let bus = Arc::clone(&bridge.bus);
    let bridge = Arc::clone(bridge);
    bus.on(method, move |payload| {
        let f = f.clone();
        let bridge = Arc::clone(&bridge);
        async move { Ok(f(bridge, payload).await) }
    });
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use quill_bus::DirectTransport;
    use quill_model::ModelProvider;
    use quill_model::ScriptedProvider;

    struct FixedFactory(Arc<dyn ModelProvider>);

    impl ProviderFactory for FixedFactory {
        fn create(&self, _spec: &str) -> anyhow::Result<Arc<dyn ModelProvider>> {
            Ok(Arc::clone(&self.0))
        }
    }

    struct Fixture {
        _data: tempfile::TempDir,
        cwd: String,
        frontend: Arc<MessageBus>,
        _bridge: Arc<NodeBridge>,
    }

    fn fixture(provider: ScriptedProvider) -> Fixture {
        let data = tempfile::tempdir().unwrap();
        let cwd_path = data.path().join("project");
        std::fs::create_dir_all(&cwd_path).unwrap();
        let (kernel_side, frontend_side) = DirectTransport::pair();
        let kernel_bus = MessageBus::new(Arc::new(kernel_side));
        let frontend = MessageBus::new(Arc::new(frontend_side));
        let bridge = NodeBridge::new(kernel_bus)
            .with_data_root(data.path().join("data"))
            .with_provider_factory(Arc::new(FixedFactory(Arc::new(provider))))
            .register();
        Fixture {
            cwd: cwd_path.display().to_string(),
            _data: data,
            frontend,
            _bridge: bridge,
        }
    }

    #[tokio::test]
    async fn status_get_reports_product() {
        let fx = fixture(ScriptedProvider::always_text("x"));
        let reply = fx.frontend.request("status.get", json!({})).await.unwrap();
        assert_eq!(reply["success"], true);
        assert_eq!(reply["data"]["product"], "quill");
    }

    #[tokio::test]
    async fn send_then_messages_list_round_trips() {
        let fx = fixture(ScriptedProvider::always_text("Hi"));
        let reply = fx
            .frontend
            .request(
                "session.send",
                json!({"cwd": fx.cwd, "sessionId": "s1", "message": "Hello"}),
            )
            .await
            .unwrap();
        assert_eq!(reply["success"], true);
        assert_eq!(reply["data"]["text"], "Hi");
        assert_eq!(reply["data"]["type"], "completed");

        let listed = fx
            .frontend
            .request(
                "session.messages.list",
                json!({"cwd": fx.cwd, "sessionId": "s1"}),
            )
            .await
            .unwrap();
        let messages = listed["data"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
    }

    #[tokio::test]
    async fn messages_list_for_unknown_session_is_empty() {
        let fx = fixture(ScriptedProvider::always_text("x"));
        let reply = fx
            .frontend
            .request(
                "session.messages.list",
                json!({"cwd": fx.cwd, "sessionId": "ghost"}),
            )
            .await
            .unwrap();
        assert_eq!(reply["data"], json!([]));
    }

    #[tokio::test]
    async fn invalid_params_return_error_envelope() {
        let fx = fixture(ScriptedProvider::always_text("x"));
        let reply = fx
            .frontend
            .request("session.send", json!({"nope": 1}))
            .await
            .unwrap();
        assert_eq!(reply["success"], false);
        assert!(reply["error"]["message"]
            .as_str()
            .unwrap()
            .contains("invalid params"));
    }

    #[tokio::test]
    async fn sessions_list_includes_summaries() {
        let fx = fixture(ScriptedProvider::always_text("Hi"));
        fx.frontend
            .request(
                "session.send",
                json!({"cwd": fx.cwd, "sessionId": "s1", "message": "Hello"}),
            )
            .await
            .unwrap();
        fx.frontend
            .request(
                "session.config.set",
                json!({"cwd": fx.cwd, "sessionId": "s1", "patch": {"summary": "greeting"}}),
            )
            .await
            .unwrap();
        let reply = fx
            .frontend
            .request("sessions.list", json!({"cwd": fx.cwd}))
            .await
            .unwrap();
        let sessions = reply["data"].as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["sessionId"], "s1");
        assert_eq!(sessions[0]["summary"], "greeting");
    }

    #[tokio::test]
    async fn session_config_set_rejects_bad_patch() {
        let fx = fixture(ScriptedProvider::always_text("x"));
        let reply = fx
            .frontend
            .request(
                "session.config.set",
                json!({"cwd": fx.cwd, "sessionId": "s1", "patch": {"approvalMode": "bogus"}}),
            )
            .await
            .unwrap();
        assert_eq!(reply["success"], false);
        assert_eq!(reply["error"]["type"], "config_invalid");
    }

    #[tokio::test]
    async fn cancel_without_running_send_restores_pairing() {
        let fx = fixture(ScriptedProvider::always_text("x"));
        // Craft a log with an unanswered tool_use, as after a crash.
        let ctx = fx._bridge.context_for(&fx.cwd).await.unwrap();
        {
            let mut log = SessionLog::open(&ctx.paths.sessions_dir, "crashed").unwrap();
            log.append_user_text("go").unwrap();
            log.append(Message::assistant(
                "crashed",
                vec![quill_model::ContentPart::ToolUse {
                    id: "t9".into(),
                    name: "bash".into(),
                    input: json!({"command": "sleep 99"}),
                }],
            ))
            .unwrap();
        }
        let reply = fx
            .frontend
            .request(
                "session.cancel",
                json!({"cwd": fx.cwd, "sessionId": "crashed"}),
            )
            .await
            .unwrap();
        assert_eq!(reply["data"]["canceled"], false);
        assert_eq!(reply["data"]["synthesizedResults"], 1);

        let path = ctx.paths.sessions_dir.join("crashed.jsonl");
        let messages = SessionLog::load(&path).unwrap();
        assert!(find_incomplete_tool_uses(&messages).is_none());
        let last = messages.last().unwrap();
        match &last.content[0] {
            quill_model::ContentPart::ToolResult { result, .. } => {
                assert!(result.is_error);
                assert_eq!(result.llm_content.to_text(), CANCEL_NOTICE);
            }
            other => panic!("expected tool_result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expand_paths_reports_refs() {
        let fx = fixture(ScriptedProvider::always_text("x"));
        std::fs::write(
            std::path::Path::new(&fx.cwd).join("a.txt"),
            "one\ntwo\n",
        )
        .unwrap();
        let reply = fx
            .frontend
            .request(
                "utils.expandPaths",
                json!({"cwd": fx.cwd, "prompt": "see @a.txt:1-2"}),
            )
            .await
            .unwrap();
        assert_eq!(reply["data"]["refs"][0]["path"], "a.txt");
        assert!(reply["data"]["block"]
            .as_str()
            .unwrap()
            .contains("<![CDATA[one\ntwo]]>"));
    }

    #[tokio::test]
    async fn models_and_styles_lists_are_nonempty() {
        let fx = fixture(ScriptedProvider::always_text("x"));
        let models = fx.frontend.request("models.list", json!({})).await.unwrap();
        assert!(!models["data"].as_array().unwrap().is_empty());
        let styles = fx
            .frontend
            .request("outputStyles.list", json!({}))
            .await
            .unwrap();
        assert!(!styles["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn workspace_exit_destroys_contexts() {
        let fx = fixture(ScriptedProvider::always_text("Hi"));
        fx.frontend
            .request(
                "session.send",
                json!({"cwd": fx.cwd, "sessionId": "s1", "message": "Hello"}),
            )
            .await
            .unwrap();
        let reply = fx
            .frontend
            .request("workspace.exit", json!({}))
            .await
            .unwrap();
        assert_eq!(reply["data"]["exited"], true);
        let status = fx.frontend.request("status.get", json!({})).await.unwrap();
        assert_eq!(status["data"]["activeContexts"], 0);
    }
}

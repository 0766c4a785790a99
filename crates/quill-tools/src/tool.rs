// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use quill_model::TodoItem;

use crate::background::BackgroundTasks;

/// Coarse risk tag used by the approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Read,
    Write,
    Command,
    Network,
    Ask,
}

/// A tool's result.  Same shape that is persisted into `tool_result` message
/// parts; failures are carried as data via `is_error`.
pub type ToolResult = quill_model::ToolResultPayload;

/// A structured question for the user, routed over the bus to whichever
/// frontend is attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_multiple: bool,
}

/// Async callback that puts questions in front of the user and resolves to
/// the answer text.  Absent in headless runs, in which case ask-category
/// tools return an error result.
pub type QuestionHandle =
    Arc<dyn Fn(Vec<UserQuestion>) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;

/// Per-invocation execution context threaded into every tool.
///
/// The cancel token is the same one carried by the enclosing `send`; tools
/// that spawn processes or make HTTP calls must observe it.
#[derive(Clone)]
pub struct ToolCtx {
    pub cwd: PathBuf,
    pub session_id: String,
    pub cancel: CancellationToken,
    /// Session-scoped todo list shared between todo_read and todo_write.
    pub todos: Arc<Mutex<Vec<TodoItem>>>,
    pub background: Arc<BackgroundTasks>,
    pub questions: Option<QuestionHandle>,
}

impl ToolCtx {
    /// A minimal context for tests and headless execution.
    pub fn for_cwd(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            session_id: String::new(),
            cancel: CancellationToken::new(),
            todos: Arc::new(Mutex::new(Vec::new())),
            background: Arc::new(BackgroundTasks::new()),
            questions: None,
        }
    }

    /// Resolve a user/model supplied path against the working directory,
    /// expanding `~`.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path);
        let p = Path::new(expanded.as_ref());
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.cwd.join(p)
        }
    }
}

/// Trait every built-in and remote-derived tool implements.
///
/// `execute` never unwinds for domain failures — wrap them with
/// [`ToolResult::err`] so the model can adapt.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the parameters object.
    fn parameters_schema(&self) -> Value;
    fn category(&self) -> ToolCategory;
    /// Per-invocation refinement of the approval requirement.  Returning
    /// `false` lets the call through without asking regardless of mode.
    fn needs_approval(&self, _args: &Value) -> bool {
        true
    }
    async fn execute(&self, ctx: &ToolCtx, args: Value) -> ToolResult;
}

/// Fetch a required string argument, or build the error result the model
/// sees when it is missing.
pub(crate) fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolResult> {
    match args.get(key).and_then(|v| v.as_str()) {
        Some(s) => Ok(s),
        None => Err(ToolResult::err(format!(
            "missing required parameter '{key}'. Received: {}",
            serde_json::to_string(args).unwrap_or_else(|_| "null".to_string())
        ))),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

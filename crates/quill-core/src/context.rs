// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Shared per-working-directory runtime state.
//!
//! A `Context` owns the loaded config, path layout, MCP manager, background
//! task registry, and plugin host.  Children receive borrowed handles; no
//! child points back at the context.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::info;

use quill_bus::MessageBus;
use quill_mcp::McpManager;
use quill_model::{MockProvider, ModelProvider, TodoItem};
use quill_session::{GlobalDataStore, Paths, SessionConfigStore};
use quill_tools::BackgroundTasks;

use crate::config::{self, Config};
use crate::plugin::{HookKind, Plugin, PluginHost};

/// Builds model adapters from `provider/model` specs.  The default factory
/// only knows the built-in mock; real adapters are contributed by the
/// embedding application or plugins.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, spec: &str) -> anyhow::Result<Arc<dyn ModelProvider>>;
}

pub struct MockProviderFactory;

impl ProviderFactory for MockProviderFactory {
    fn create(&self, spec: &str) -> anyhow::Result<Arc<dyn ModelProvider>> {
        let provider = spec.split('/').next().unwrap_or(spec);
        if provider == "mock" {
            Ok(Arc::new(MockProvider))
        } else {
            anyhow::bail!("no adapter registered for provider '{provider}'")
        }
    }
}

pub struct ContextOptions {
    pub cwd: PathBuf,
    pub product_name: String,
    /// Highest-priority config overlay from the command line.
    pub argv_config: Option<serde_yaml::Value>,
    pub plugins: Vec<Arc<dyn Plugin>>,
    pub bus: Option<Arc<MessageBus>>,
    /// Test override for the data root; defaults to the platform dir.
    pub data_root: Option<PathBuf>,
    pub provider_factory: Option<Arc<dyn ProviderFactory>>,
}

impl ContextOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            product_name: "quill".to_string(),
            argv_config: None,
            plugins: Vec::new(),
            bus: None,
            data_root: None,
            provider_factory: None,
        }
    }
}

pub struct Context {
    pub cwd: PathBuf,
    pub product_name: String,
    pub config: Config,
    pub paths: Paths,
    pub bus: Option<Arc<MessageBus>>,
    pub mcp: Arc<McpManager>,
    pub background: Arc<BackgroundTasks>,
    pub plugins: Arc<PluginHost>,
    pub session_store: SessionConfigStore,
    pub global_data: GlobalDataStore,
    provider_factory: Arc<dyn ProviderFactory>,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    session_todos: Mutex<HashMap<String, Arc<Mutex<Vec<TodoItem>>>>>,
}

impl Context {
    pub async fn create(opts: ContextOptions) -> anyhow::Result<Arc<Self>> {
        let paths = match &opts.data_root {
            Some(root) => Paths::under(root.clone(), &opts.cwd),
            None => Paths::resolve(&opts.product_name, &opts.cwd),
        };
        let config = config::load(&paths.global_dir, &opts.cwd, opts.argv_config)
            .context("loading configuration")?;

        let context = Arc::new(Self {
            mcp: Arc::new(McpManager::new(config.mcp_servers.clone())),
            background: Arc::new(BackgroundTasks::new()),
            plugins: Arc::new(PluginHost::new(opts.plugins)),
            session_store: SessionConfigStore::new(&paths.sessions_dir),
            global_data: GlobalDataStore::new(&paths.data_file),
            provider_factory: opts
                .provider_factory
                .unwrap_or_else(|| Arc::new(MockProviderFactory)),
            cwd: opts.cwd,
            product_name: opts.product_name,
            config,
            paths,
            bus: opts.bus,
            session_locks: Mutex::new(HashMap::new()),
            session_todos: Mutex::new(HashMap::new()),
        });

        let args = json!({"cwd": context.cwd.display().to_string()});
        context
            .plugins
            .apply("initialized", &args, None, HookKind::Parallel)
            .await?;
        info!(cwd = %context.cwd.display(), "context created");
        Ok(context)
    }

    /// Close MCP clients and kill background tasks.  Session logs survive.
    pub async fn destroy(&self) {
        self.mcp.destroy().await;
        self.background.kill_all().await;
        info!(cwd = %self.cwd.display(), "context destroyed");
    }

    /// The per-session mutex that makes a session single-writer.
    pub async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        Arc::clone(
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// The session-scoped todo list shared by the todo tools.
    pub async fn session_todos(&self, session_id: &str) -> Arc<Mutex<Vec<TodoItem>>> {
        let mut todos = self.session_todos.lock().await;
        Arc::clone(
            todos
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Vec::new()))),
        )
    }

    pub fn resolve_provider(&self, spec: &str) -> anyhow::Result<Arc<dyn ModelProvider>> {
        self.provider_factory.create(spec)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

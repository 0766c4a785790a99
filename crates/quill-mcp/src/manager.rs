// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Owns remote tool-server connections: lazy idempotent init, per-server
//! status tracking with failure classification, caller-driven retry, and
//! conversion of remote tools into local [`quill_tools::Tool`] instances.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use quill_tools::Tool;

use crate::client::{McpClient, RemoteToolInfo};
use crate::config::McpServerConfig;
use crate::errors::{classify_transience, McpError};
use crate::tool::McpTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum McpServerStatus {
    Pending,
    Connecting,
    Connected,
    Failed,
    Disconnected,
}

/// Status snapshot reported to frontends.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStateReport {
    pub status: McpServerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transient: Option<bool>,
    pub retry_count: u32,
    pub tool_count: usize,
}

struct ServerEntry {
    config: McpServerConfig,
    status: McpServerStatus,
    error: Option<String>,
    transient: Option<bool>,
    retry_count: u32,
    client: Option<Arc<McpClient>>,
    tools: Vec<RemoteToolInfo>,
}

impl ServerEntry {
    fn new(config: McpServerConfig) -> Self {
        Self {
            config,
            status: McpServerStatus::Pending,
            error: None,
            transient: None,
            retry_count: 0,
            client: None,
            tools: Vec::new(),
        }
    }

    fn report(&self) -> ServerStateReport {
        ServerStateReport {
            status: self.status,
            error: self.error.clone(),
            transient: self.transient,
            retry_count: self.retry_count,
            tool_count: self.tools.len(),
        }
    }
}

pub struct McpManager {
    configs: BTreeMap<String, McpServerConfig>,
    servers: Mutex<BTreeMap<String, ServerEntry>>,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
    /// Serializes retry_connection per server without holding the state
    /// lock across the reconnect.
    retry_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl McpManager {
    pub fn new(configs: BTreeMap<String, McpServerConfig>) -> Self {
        Self {
            configs,
            servers: Mutex::new(BTreeMap::new()),
            initialized: AtomicBool::new(false),
            init_lock: Mutex::new(()),
            retry_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Connect every enabled server.  Idempotent and concurrent-safe: the
    /// first caller does the work, racing callers wait on the init lock and
    /// then observe the flag.
    pub async fn init_async(&self) {
        if self.initialized.load(Ordering::SeqCst) {
            return;
        }
        let _guard = self.init_lock.lock().await;
        if self.initialized.load(Ordering::SeqCst) {
            return;
        }

        let enabled: Vec<(String, McpServerConfig)> = self
            .configs
            .iter()
            .filter(|(_, c)| !c.disable)
            .map(|(n, c)| (n.clone(), c.clone()))
            .collect();

        {
            let mut servers = self.servers.lock().await;
            for (name, config) in &enabled {
                servers.insert(name.clone(), ServerEntry::new(config.clone()));
            }
        }

        let connections = enabled.iter().map(|(name, config)| async move {
            (name.clone(), Self::connect_one(name, config).await)
        });
        let results = futures::future::join_all(connections).await;

        let mut servers = self.servers.lock().await;
        for (name, outcome) in results {
            if let Some(entry) = servers.get_mut(&name) {
                Self::apply_outcome(entry, outcome);
            }
        }
        self.initialized.store(true, Ordering::SeqCst);
    }

    async fn connect_one(
        name: &str,
        config: &McpServerConfig,
    ) -> Result<(Arc<McpClient>, Vec<RemoteToolInfo>), McpError> {
        let client = McpClient::connect(name, config).await?;
        let tools = client.tools().await?;
        info!(server = name, tools = tools.len(), "MCP server connected");
        Ok((Arc::new(client), tools))
    }

    fn apply_outcome(
        entry: &mut ServerEntry,
        outcome: Result<(Arc<McpClient>, Vec<RemoteToolInfo>), McpError>,
    ) {
        match outcome {
            Ok((client, tools)) => {
                entry.status = McpServerStatus::Connected;
                entry.error = None;
                entry.transient = None;
                entry.client = Some(client);
                entry.tools = tools;
            }
            Err(e) => {
                let message = e.to_string();
                let transient = classify_transience(&message);
                warn!(error = %message, transient, "MCP server connection failed");
                entry.status = McpServerStatus::Failed;
                entry.transient = Some(transient);
                entry.error = Some(message);
                entry.client = None;
                entry.tools.clear();
            }
        }
    }

    /// Move a server from `failed` back through `connecting`.  Allowed even
    /// for permanent failures — the user may have fixed the environment.
    pub async fn retry_connection(&self, name: &str) -> Result<ServerStateReport, McpError> {
        let per_server = {
            let mut locks = self.retry_locks.lock().await;
            Arc::clone(
                locks
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _guard = per_server.lock().await;

        let config = {
            let mut servers = self.servers.lock().await;
            let entry = servers
                .get_mut(name)
                .ok_or_else(|| McpError::InvalidConfig(format!("unknown server: {name}")))?;
            entry.status = McpServerStatus::Connecting;
            entry.retry_count += 1;
            entry.config.clone()
        };

        let outcome = Self::connect_one(name, &config).await;
        let mut servers = self.servers.lock().await;
        let entry = servers
            .get_mut(name)
            .ok_or_else(|| McpError::InvalidConfig(format!("unknown server: {name}")))?;
        Self::apply_outcome(entry, outcome);
        Ok(entry.report())
    }

    /// Per-server status snapshots.
    pub async fn statuses(&self) -> BTreeMap<String, ServerStateReport> {
        let servers = self.servers.lock().await;
        servers
            .iter()
            .map(|(name, entry)| (name.clone(), entry.report()))
            .collect()
    }

    /// Local [`Tool`] adapters for every tool on every connected server.
    pub async fn tools(&self) -> Vec<Arc<dyn Tool>> {
        let servers = self.servers.lock().await;
        let mut out: Vec<Arc<dyn Tool>> = Vec::new();
        for (name, entry) in servers.iter() {
            let Some(client) = &entry.client else { continue };
            for info in &entry.tools {
                out.push(Arc::new(McpTool::new(
                    name,
                    info.clone(),
                    Arc::clone(client),
                )));
            }
        }
        out
    }

    /// Close every client, clear state, reset the init flag.
    pub async fn destroy(&self) {
        let clients: Vec<Arc<McpClient>> = {
            let mut servers = self.servers.lock().await;
            let clients = servers
                .values_mut()
                .filter_map(|e| {
                    e.status = McpServerStatus::Disconnected;
                    e.tools.clear();
                    e.client.take()
                })
                .collect();
            servers.clear();
            clients
        };
        let closes = clients.iter().map(|c| c.close());
        futures::future::join_all(closes).await;
        self.initialized.store(false, Ordering::SeqCst);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(configs: Vec<(&str, McpServerConfig)>) -> McpManager {
        McpManager::new(
            configs
                .into_iter()
                .map(|(n, c)| (n.to_string(), c))
                .collect(),
        )
    }

    #[tokio::test]
    async fn disabled_servers_are_skipped() {
        let mut cfg = McpServerConfig::stdio("whatever", vec![]);
        cfg.disable = true;
        let mgr = manager_with(vec![("off", cfg)]);
        mgr.init_async().await;
        assert!(mgr.statuses().await.is_empty());
        assert!(mgr.tools().await.is_empty());
    }

    #[tokio::test]
    async fn missing_command_yields_permanent_failure() {
        let mgr = manager_with(vec![(
            "broken",
            McpServerConfig::stdio("no-such-binary-quill-test", vec![]),
        )]);
        mgr.init_async().await;
        let statuses = mgr.statuses().await;
        let report = &statuses["broken"];
        assert_eq!(report.status, McpServerStatus::Failed);
        assert_eq!(report.transient, Some(false));
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn init_is_idempotent_under_concurrency() {
        let mgr = Arc::new(manager_with(vec![(
            "broken",
            McpServerConfig::stdio("no-such-binary-quill-test", vec![]),
        )]));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let mgr = Arc::clone(&mgr);
                tokio::spawn(async move { mgr.init_async().await })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }
        let statuses = mgr.statuses().await;
        // One entry, not eight racing ones, and retry_count untouched.
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses["broken"].retry_count, 0);
    }

    #[tokio::test]
    async fn retry_on_failed_server_increments_count() {
        let mgr = manager_with(vec![(
            "broken",
            McpServerConfig::stdio("no-such-binary-quill-test", vec![]),
        )]);
        mgr.init_async().await;
        let report = mgr.retry_connection("broken").await.unwrap();
        assert_eq!(report.status, McpServerStatus::Failed);
        assert_eq!(report.retry_count, 1);
    }

    #[tokio::test]
    async fn retry_unknown_server_is_an_error() {
        let mgr = manager_with(vec![]);
        mgr.init_async().await;
        assert!(mgr.retry_connection("ghost").await.is_err());
    }

    #[tokio::test]
    async fn destroy_clears_state_and_resets_init() {
        let mgr = manager_with(vec![(
            "broken",
            McpServerConfig::stdio("no-such-binary-quill-test", vec![]),
        )]);
        mgr.init_async().await;
        assert_eq!(mgr.statuses().await.len(), 1);
        mgr.destroy().await;
        assert!(mgr.statuses().await.is_empty());
        // Init runs again after destroy.
        mgr.init_async().await;
        assert_eq!(mgr.statuses().await.len(), 1);
    }
}

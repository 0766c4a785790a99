// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Coarse approval policy for a session.
///
/// `default` asks, `autoEdit` lets write tools through silently, `yolo`
/// allows everything except `ask`-category tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalMode {
    #[default]
    Default,
    AutoEdit,
    Yolo,
}

/// Per-session sidecar stored as `<sessionId>.json` next to the log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub approval_mode: ApprovalMode,
    /// Tools the user approved for the rest of the session.
    #[serde(default)]
    pub approval_tools: BTreeSet<String>,
    #[serde(default)]
    pub additional_directories: Vec<String>,
    /// Placeholder substitutions recorded by frontends for `[Pasted text #N]`.
    #[serde(default)]
    pub pasted_text_map: BTreeMap<String, String>,
    #[serde(default)]
    pub pasted_image_map: BTreeMap<String, String>,
    /// Per-session model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Load-modify-write store for session sidecars.  Callers within one process
/// must serialize updates per session; the kernel does so by holding the
/// per-session lock across turns.
#[derive(Debug, Clone)]
pub struct SessionConfigStore {
    dir: PathBuf,
}

impl SessionConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// Load the sidecar, or the default when it does not exist yet.
    pub fn load(&self, session_id: &str) -> anyhow::Result<SessionConfig> {
        let path = self.path(session_id);
        if !path.is_file() {
            return Ok(SessionConfig::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self, session_id: &str, config: &SessionConfig) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.path(session_id);
        let text = serde_json::to_string_pretty(config).context("serializing session config")?;
        std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
    }

    /// Load, apply `mutate`, save.
    pub fn update(
        &self,
        session_id: &str,
        mutate: impl FnOnce(&mut SessionConfig),
    ) -> anyhow::Result<SessionConfig> {
        let mut config = self.load(session_id)?;
        mutate(&mut config);
        self.save(session_id, &config)?;
        Ok(config)
    }

    /// Session ids that have a sidecar under this store.
    pub fn list(&self) -> Vec<String> {
        list_json_stems(&self.dir)
    }
}

pub(crate) fn list_json_stems(dir: &Path) -> Vec<String> {
    let mut out = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    out.push(stem.to_string());
                }
            }
        }
    }
    out.sort();
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

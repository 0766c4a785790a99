// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Per-project prompt history kept in the global data file.
const HISTORY_CAP: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectData {
    /// Prompts, most recent first, deduplicated.
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,
}

/// The one global data file at `<globalConfigDir>/data.json`, keyed by
/// project working directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalData {
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectData>,
}

#[derive(Debug, Clone)]
pub struct GlobalDataStore {
    path: PathBuf,
}

impl GlobalDataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> anyhow::Result<GlobalData> {
        if !self.path.is_file() {
            return Ok(GlobalData::default());
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", self.path.display()))
    }

    pub fn save(&self, data: &GlobalData) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(data).context("serializing global data")?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("writing {}", self.path.display()))
    }

    /// Record a prompt into a project's history and bump `last_accessed`.
    /// The prompt moves to the front; duplicates collapse; the list is
    /// capped at 100 entries.
    pub fn record_prompt(&self, cwd: &str, prompt: &str) -> anyhow::Result<()> {
        let mut data = self.load()?;
        let project = data.projects.entry(cwd.to_string()).or_default();
        project.history.retain(|p| p != prompt);
        project.history.insert(0, prompt.to_string());
        project.history.truncate(HISTORY_CAP);
        project.last_accessed = Some(Utc::now().to_rfc3339());
        self.save(&data)
    }

    pub fn project_history(&self, cwd: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .load()?
            .projects
            .get(cwd)
            .map(|p| p.history.clone())
            .unwrap_or_default())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

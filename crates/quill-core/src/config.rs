// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use quill_mcp::McpServerConfig;
use quill_session::ApprovalMode;

fn default_max_turns() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

fn default_bash_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Default model as `provider/model`, e.g. `anthropic/claude-sonnet-4-5`.
    pub default: Option<String>,
    /// Model used by plan mode.
    pub plan: Option<String>,
    /// Model used when the conversation carries images.
    pub vision: Option<String>,
    /// Small model used for compaction summaries.
    pub small: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub approval_mode: ApprovalMode,
    /// Per-tool enable/disable overrides; only an explicit `false` disables.
    #[serde(default)]
    pub tools: BTreeMap<String, bool>,
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_true")]
    pub auto_compact: bool,
    #[serde(default = "default_bash_timeout")]
    pub bash_timeout_secs: u64,
    /// Response language override, e.g. "German".
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub output_style: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelSettings::default(),
            approval_mode: ApprovalMode::default(),
            tools: BTreeMap::new(),
            mcp_servers: BTreeMap::new(),
            max_turns: default_max_turns(),
            auto_compact: true,
            bash_timeout_secs: default_bash_timeout(),
            language: None,
            output_style: None,
        }
    }
}

/// Layered load: global config, then project files, then the argv overlay;
/// later layers win on scalar conflicts.
pub fn load(
    global_dir: &Path,
    cwd: &Path,
    argv_overlay: Option<serde_yaml::Value>,
) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    let candidates = [
        global_dir.join("config.yaml"),
        global_dir.join("config.yml"),
        cwd.join(".quill.yaml"),
        cwd.join(".quill.yml"),
        cwd.join("quill.yaml"),
    ];
    for path in candidates {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }
    if let Some(overlay) = argv_overlay {
        merge_yaml(&mut merged, overlay);
    }

    if matches!(&merged, serde_yaml::Value::Mapping(m) if m.is_empty()) {
        return Ok(Config::default());
    }
    let mut config: Config =
        serde_yaml::from_value(merged).context("invalid merged configuration")?;
    if config.max_turns == 0 {
        config.max_turns = default_max_turns();
    }
    Ok(config)
}

/// Deep-merge `src` into `dst`; `src` wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                match d.get_mut(&k) {
                    Some(existing) => merge_yaml(existing, v),
                    None => {
                        d.insert(k, v);
                    }
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

/// Resolved filesystem layout for one product + working directory.
///
/// Everything lives under a single data root (default
/// `~/.local/share/<product>`); per-project paths encode the working
/// directory so two checkouts never share session state.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root for global state: config, data.json.
    pub global_dir: PathBuf,
    /// The global data file keyed by project cwd.
    pub data_file: PathBuf,
    /// Per-project session logs and sidecars.
    pub sessions_dir: PathBuf,
    /// Per-project raw request logs.
    pub request_logs_dir: PathBuf,
}

impl Paths {
    /// Resolve under the platform data directory.
    pub fn resolve(product_name: &str, cwd: &Path) -> Self {
        let root = dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join(product_name);
        Self::under(root, cwd)
    }

    /// Resolve under an explicit root.  Used by tests and by the
    /// `--data-dir` override.
    pub fn under(root: impl Into<PathBuf>, cwd: &Path) -> Self {
        let root = root.into();
        let project_dir = root.join("projects").join(encode_cwd(cwd));
        Self {
            data_file: root.join("data.json"),
            global_dir: root,
            sessions_dir: project_dir.join("sessions"),
            request_logs_dir: project_dir.join("request-logs"),
        }
    }
}

/// Encode a working directory into a single path component.
/// `/work/my proj` → `-work-my-proj`.
fn encode_cwd(cwd: &Path) -> String {
    let s = cwd.to_string_lossy();
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Raw per-request diagnostics: `<requestId>.jsonl` with a metadata first
//! line followed by the chunks captured from the stream engine.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;

pub struct RequestLogWriter {
    path: PathBuf,
    file: File,
}

impl RequestLogWriter {
    /// Create the log for `request_id`, writing the metadata line
    /// `{request, response, model, prompt, tools, error?}` first.
    pub fn create(dir: &Path, request_id: &str, metadata: &Value) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating request log directory {}", dir.display()))?;
        let path = dir.join(format!("{request_id}.jsonl"));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening request log {}", path.display()))?;
        writeln!(file, "{metadata}")
            .with_context(|| format!("writing metadata to {}", path.display()))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one raw chunk line.  Diagnostics only — failures are reported
    /// but must not abort the stream, so callers typically log and continue.
    pub fn append_chunk(&mut self, chunk: &Value) -> anyhow::Result<()> {
        writeln!(self.file, "{chunk}")
            .with_context(|| format!("appending chunk to {}", self.path.display()))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Append-only JSONL session log.
//!
//! One session per file, one JSON object per line, UTF-8, no header.  The
//! file is only ever appended to: fork and compaction are read-side concepts
//! and never rewrite existing bytes.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::warn;

use quill_model::{Message, Role};

/// An on-disk session log plus its derived in-memory indices.
pub struct SessionLog {
    session_id: String,
    path: PathBuf,
    file: File,
    messages: Vec<Message>,
    uuid_to_position: HashMap<String, usize>,
    parent_children: HashMap<String, Vec<String>>,
    latest_uuid: Option<String>,
}

impl SessionLog {
    /// Open (or create) the log for `session_id` under `dir`, replaying any
    /// existing entries into the in-memory view.
    pub fn open(dir: &Path, session_id: &str) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating session directory {}", dir.display()))?;
        let path = dir.join(format!("{session_id}.jsonl"));
        let messages = if path.is_file() {
            Self::load(&path)?
        } else {
            Vec::new()
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening session log {}", path.display()))?;

        let mut log = Self {
            session_id: session_id.to_string(),
            path,
            file,
            messages: Vec::new(),
            uuid_to_position: HashMap::new(),
            parent_children: HashMap::new(),
            latest_uuid: None,
        };
        for m in messages {
            log.index(m);
        }
        Ok(log)
    }

    /// Scan a log file into messages.  Corrupt lines are skipped with a
    /// warning; a truncated trailing line is treated as absent.
    pub fn load(path: &Path) -> anyhow::Result<Vec<Message>> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading session log {}", path.display()))?;
        let mut messages = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(m) => messages.push(m),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        line = lineno + 1,
                        error = %e,
                        "skipping corrupt session log line"
                    );
                }
            }
        }
        Ok(messages)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn latest_uuid(&self) -> Option<&str> {
        self.latest_uuid.as_deref()
    }

    /// Append one message, assigning `parent_uuid` to the latest entry when
    /// the caller did not set one.  Write errors fail the enclosing
    /// operation — a persisted turn is never silently dropped.
    pub fn append(&mut self, mut message: Message) -> anyhow::Result<&Message> {
        if message.parent_uuid.is_none() {
            message.parent_uuid = self.latest_uuid.clone();
        }
        if message.session_id.is_empty() {
            message.session_id = self.session_id.clone();
        }
        let line = serde_json::to_string(&message).context("serializing message")?;
        writeln!(self.file, "{line}")
            .with_context(|| format!("appending to {}", self.path.display()))?;
        self.file
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))?;
        self.index(message);
        Ok(self.messages.last().unwrap_or_else(|| unreachable!()))
    }

    /// Convenience: append a synthetic plain-text user turn.
    pub fn append_user_text(&mut self, text: &str) -> anyhow::Result<Message> {
        let msg = Message::user(self.session_id.clone(), text);
        Ok(self.append(msg)?.clone())
    }

    /// Messages in append order strictly before the entry with `uuid`.
    /// Returns the whole view when the uuid is unknown.  This is the fork
    /// read: later descendants are dropped from the active view while the
    /// log bytes stay untouched.
    pub fn messages_up_to(&self, uuid: &str) -> &[Message] {
        match self.uuid_to_position.get(uuid) {
            Some(&pos) => &self.messages[..pos],
            None => &self.messages,
        }
    }

    /// Children of a message in the parent/child index.
    pub fn children_of(&self, uuid: &str) -> &[String] {
        self.parent_children
            .get(uuid)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn index(&mut self, message: Message) {
        let pos = self.messages.len();
        self.uuid_to_position.insert(message.uuid.clone(), pos);
        if let Some(parent) = &message.parent_uuid {
            self.parent_children
                .entry(parent.clone())
                .or_default()
                .push(message.uuid.clone());
        }
        self.latest_uuid = Some(message.uuid.clone());
        self.messages.push(message);
    }
}

/// The most recent assistant message whose tool_use parts are not all
/// answered, together with the unanswered uses.
#[derive(Debug, Clone)]
pub struct IncompleteToolUses {
    /// Uuid of the assistant message.
    pub assistant_uuid: String,
    /// `(id, name, input)` of each unanswered tool_use, in message order.
    pub pending: Vec<(String, String, serde_json::Value)>,
}

/// Walk backward to the last assistant message with tool_use parts, then
/// scan forward collecting results.  Returns `None` when there is no such
/// assistant message or every use is answered.
pub fn find_incomplete_tool_uses(messages: &[Message]) -> Option<IncompleteToolUses> {
    let (pos, assistant) = messages
        .iter()
        .enumerate()
        .rev()
        .find(|(_, m)| m.role == Role::Assistant && !m.tool_uses().is_empty())?;

    let mut answered: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for m in &messages[pos + 1..] {
        for id in m.tool_result_ids() {
            answered.insert(id);
        }
    }

    let pending: Vec<(String, String, serde_json::Value)> = assistant
        .tool_uses()
        .into_iter()
        .filter(|(id, _, _)| !answered.contains(*id))
        .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
        .collect();

    if pending.is_empty() {
        None
    } else {
        Some(IncompleteToolUses {
            assistant_uuid: assistant.uuid.clone(),
            pending,
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

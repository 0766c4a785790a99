// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// An interactive AI coding agent kernel.
///
/// With a prompt argument, runs one headless send against the current
/// project and prints the streamed reply.  Frontends (terminal UI, browser)
/// attach over the message bus instead.
#[derive(Parser, Debug)]
#[command(name = "quill", version, about)]
pub struct Cli {
    /// The prompt to send.  Omit it when using a subcommand.
    pub prompt: Option<String>,

    /// Project working directory.
    #[arg(long, short = 'C', default_value = ".")]
    pub cwd: PathBuf,

    /// Session to continue; a fresh one is created when omitted.
    #[arg(long)]
    pub session: Option<String>,

    /// Model override as `provider/model`.
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// Plan mode: read-only toolset, produces a reviewable plan.
    #[arg(long)]
    pub plan: bool,

    /// Data root override (default: the platform data directory).
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List sessions recorded for this project.
    Sessions,
    /// Show remote tool-server connection status.
    Mcp,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

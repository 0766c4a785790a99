// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod approval;
pub mod atpath;
pub mod compact;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod plugin;
pub mod project;
pub mod prompt;
pub mod stream;
pub mod turn;

pub use approval::{auto_decision, ApprovalDecision, ApprovalGate};
pub use config::Config;
pub use context::{Context, ContextOptions, ProviderFactory};
pub use error::KernelError;
pub use events::TurnEvent;
pub use project::{Attachment, ProjectSession, SendOptions, SendOutcome};
pub use stream::{StreamAttempt, StreamEngine, StreamOutcome, ToolCallRequest};
pub use turn::{LoopEnd, LoopOutcome, TurnLoop, TurnLoopOptions, CANCEL_NOTICE};

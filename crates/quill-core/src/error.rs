// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Kernel error taxonomy.
///
/// Tool failures and denials never appear here: they are data, fed back to
/// the model as error tool_results.  These variants are the terminal
/// conditions that end a loop or fail a bridge operation.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("canceled")]
    Canceled,
    #[error("maximum turns exceeded ({0})")]
    MaxTurnsExceeded(u32),
    #[error("api error: {message}")]
    Api { message: String, retryable: bool },
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("session {0} already has a request in flight")]
    SessionBusy(String),
    #[error("invalid config: {0}")]
    ConfigInvalid(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl KernelError {
    /// Wire tag used in bus error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Canceled => "canceled",
            Self::MaxTurnsExceeded(_) => "max_turns_exceeded",
            Self::Api { .. } => "api_error",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::SessionBusy(_) => "session_busy",
            Self::ConfigInvalid(_) => "config_invalid",
            Self::Internal(_) => "internal",
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_wire_tags() {
        assert_eq!(KernelError::Canceled.kind(), "canceled");
        assert_eq!(KernelError::MaxTurnsExceeded(50).kind(), "max_turns_exceeded");
        assert_eq!(
            KernelError::Api {
                message: "x".into(),
                retryable: false
            }
            .kind(),
            "api_error"
        );
    }

    #[test]
    fn display_includes_detail() {
        let e = KernelError::SessionBusy("s1".into());
        assert!(e.to_string().contains("s1"));
    }
}

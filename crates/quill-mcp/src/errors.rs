// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("{0}")]
    InvalidConfig(String),
    #[error("failed to spawn {command}: {message}")]
    Spawn { command: String, message: String },
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("tool call '{tool}' failed: {message}")]
    ToolCall { tool: String, message: String },
    #[error("tool call '{0}' timed out")]
    Timeout(String),
}

/// Substrings that mark a failure as permanent: reconnecting without a
/// config change cannot help.
const PERMANENT_MARKERS: &[&str] = &[
    "command not found",
    "no such file",
    "permission denied",
    "invalid configuration",
    "malformed",
    "syntax error",
    "authentication failed",
    "unauthorized",
];

/// Substrings that mark a failure as transient.
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "econnreset",
    "enotfound",
    "econnrefused",
    "etimedout",
    "rate limit",
    "service unavailable",
    "socket hang up",
];

/// Classify an error message: `true` means transient (retry may succeed).
/// Unknown errors default to transient — retries are cheap.
pub fn classify_transience(message: &str) -> bool {
    let lower = message.to_lowercase();
    if PERMANENT_MARKERS.iter().any(|m| lower.contains(m)) {
        return false;
    }
    if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    true
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_failures_are_permanent() {
        assert!(!classify_transience("bash: mcp-srv: command not found"));
        assert!(!classify_transience("No such file or directory"));
        assert!(!classify_transience("Permission denied (os error 13)"));
    }

    #[test]
    fn auth_failures_are_permanent() {
        assert!(!classify_transience("401 Unauthorized"));
        assert!(!classify_transience("authentication failed for server"));
    }

    #[test]
    fn network_failures_are_transient() {
        assert!(classify_transience("connect ECONNREFUSED 127.0.0.1:9"));
        assert!(classify_transience("read ECONNRESET"));
        assert!(classify_transience("getaddrinfo ENOTFOUND mcp.example"));
        assert!(classify_transience("429 rate limit exceeded"));
        assert!(classify_transience("503 Service Unavailable"));
        assert!(classify_transience("socket hang up"));
    }

    #[test]
    fn timeouts_are_transient() {
        assert!(classify_transience("request timeout after 30s"));
        assert!(classify_transience("ETIMEDOUT"));
    }

    #[test]
    fn unknown_errors_default_to_transient() {
        assert!(classify_transience("something completely novel happened"));
    }

    #[test]
    fn permanent_wins_over_transient_markers() {
        // A message containing markers from both lists is permanent: a
        // malformed config will not fix itself however often we retry.
        assert!(!classify_transience("malformed response after timeout"));
    }
}

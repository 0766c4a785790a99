// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::McpError;

/// How a URL-based server is reached.  `sse` is accepted for compatibility
/// and served over the same streamable HTTP transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    Sse,
    Http,
}

/// One remote tool-server entry.
///
/// Two shapes are valid: stdio (`command` + `args` + `env`) and URL
/// (`url` + optional `type`/`headers`).  Exactly one of `command`/`url`
/// must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<McpTransportKind>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Skipped at init when true.
    #[serde(default)]
    pub disable: bool,
    /// Per-call timeout for this server's tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// The validated connection shape of a config.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerShape {
    Stdio {
        command: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    },
    Url {
        url: String,
        headers: BTreeMap<String, String>,
    },
}

impl McpServerConfig {
    pub fn shape(&self) -> Result<ServerShape, McpError> {
        match (&self.command, &self.url) {
            (Some(command), None) => Ok(ServerShape::Stdio {
                command: command.clone(),
                args: self.args.clone(),
                env: self.env.clone(),
            }),
            (None, Some(url)) => Ok(ServerShape::Url {
                url: url.clone(),
                headers: self.headers.clone(),
            }),
            (Some(_), Some(_)) => Err(McpError::InvalidConfig(
                "invalid configuration: both command and url set".into(),
            )),
            (None, None) => Err(McpError::InvalidConfig(
                "invalid configuration: neither command nor url set".into(),
            )),
        }
    }

    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: Some(command.into()),
            args,
            ..Default::default()
        }
    }

    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            kind: Some(McpTransportKind::Http),
            ..Default::default()
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire frame exchanged between two buses.  Over a network transport this is
/// one JSON object per frame; over a [`crate::DirectTransport`] it is passed
/// by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version.  Always 1.
    pub v: u8,
    pub kind: EnvelopeKind,
    /// Correlation id for request/response pairs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Namespaced method name, requests only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Topic name, events only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default)]
    pub payload: Value,
    /// Error payload on failed responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Request,
    Response,
    Event,
}

impl Envelope {
    pub fn request(id: impl Into<String>, method: impl Into<String>, payload: Value) -> Self {
        Self {
            v: 1,
            kind: EnvelopeKind::Request,
            id: Some(id.into()),
            method: Some(method.into()),
            topic: None,
            payload,
            error: None,
        }
    }

    pub fn response(id: impl Into<String>, payload: Value) -> Self {
        Self {
            v: 1,
            kind: EnvelopeKind::Response,
            id: Some(id.into()),
            method: None,
            topic: None,
            payload,
            error: None,
        }
    }

    pub fn response_error(id: impl Into<String>, error: Value) -> Self {
        Self {
            v: 1,
            kind: EnvelopeKind::Response,
            id: Some(id.into()),
            method: None,
            topic: None,
            payload: Value::Null,
            error: Some(error),
        }
    }

    pub fn event(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            v: 1,
            kind: EnvelopeKind::Event,
            id: None,
            method: None,
            topic: Some(topic.into()),
            payload,
            error: None,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

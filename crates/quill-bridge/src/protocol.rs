// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Typed payloads for the frontend-facing bus methods, plus the response
//! envelope helpers.  Every handler answers `{success: true, data}` or
//! `{success: false, error: {message, type?}}`.

use serde::Deserialize;
use serde_json::{json, Value};

pub fn envelope_ok(data: Value) -> Value {
    json!({"success": true, "data": data})
}

pub fn envelope_err(message: impl Into<String>, kind: Option<&str>) -> Value {
    let mut error = json!({"message": message.into()});
    if let Some(kind) = kind {
        error["type"] = json!(kind);
    }
    json!({"success": false, "error": error})
}

/// Params shared by every per-project method.
#[derive(Debug, Deserialize)]
pub struct CwdParams {
    pub cwd: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    pub cwd: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentParam {
    pub data: String,
    pub mime_type: String,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendParams {
    pub cwd: String,
    /// Absent starts a fresh session.
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentParam>,
    #[serde(default)]
    pub plan_mode: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpRetryParams {
    pub cwd: String,
    pub server: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfigSetParams {
    pub cwd: String,
    pub session_id: String,
    /// Partial sidecar: present fields replace, absent fields keep.
    pub patch: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandPathsParams {
    pub cwd: String,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundTaskParams {
    pub cwd: String,
    pub task_id: String,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_shape() {
        let v = envelope_ok(json!({"x": 1}));
        assert_eq!(v["success"], true);
        assert_eq!(v["data"]["x"], 1);
    }

    #[test]
    fn err_envelope_with_and_without_type() {
        let with = envelope_err("boom", Some("api_error"));
        assert_eq!(with["success"], false);
        assert_eq!(with["error"]["message"], "boom");
        assert_eq!(with["error"]["type"], "api_error");

        let without = envelope_err("boom", None);
        assert!(without["error"].get("type").is_none());
    }

    #[test]
    fn send_params_accept_minimal_payload() {
        let p: SendParams =
            serde_json::from_value(json!({"cwd": "/p", "message": "hi"})).unwrap();
        assert!(p.session_id.is_none());
        assert!(!p.plan_mode);
        assert!(p.attachments.is_empty());
    }

    #[test]
    fn send_params_accept_full_payload() {
        let p: SendParams = serde_json::from_value(json!({
            "cwd": "/p",
            "sessionId": "s1",
            "message": "go",
            "model": "mock/mock-model",
            "planMode": true,
            "attachments": [{"data": "QUJD", "mimeType": "image/png"}],
        }))
        .unwrap();
        assert_eq!(p.session_id.as_deref(), Some("s1"));
        assert!(p.plan_mode);
        assert_eq!(p.attachments[0].mime_type, "image/png");
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Static metadata about a provider/model combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider_id: String,
    pub model_id: String,
    pub limits: ModelLimits,
    pub capabilities: ModelCapabilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelLimits {
    /// Context window in tokens.
    pub context: u32,
    /// Maximum output tokens per completion.
    pub output: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub reasoning: bool,
    pub attachment: bool,
    pub tool_call: bool,
    pub temperature: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThinkingConfig {
    pub budget_tokens: u32,
}

impl ModelInfo {
    /// Conservative fallback for models absent from the catalog: text-only,
    /// 128k context, 4k output.
    pub fn fallback(provider_id: &str, model_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            model_id: model_id.to_string(),
            limits: ModelLimits {
                context: 128_000,
                output: 4_096,
            },
            capabilities: ModelCapabilities {
                reasoning: false,
                attachment: false,
                tool_call: true,
                temperature: true,
            },
            thinking: None,
        }
    }
}

fn entry(
    provider: &str,
    model: &str,
    context: u32,
    output: u32,
    reasoning: bool,
    attachment: bool,
) -> ModelInfo {
    ModelInfo {
        provider_id: provider.to_string(),
        model_id: model.to_string(),
        limits: ModelLimits { context, output },
        capabilities: ModelCapabilities {
            reasoning,
            attachment,
            tool_call: true,
            temperature: true,
        },
        thinking: if reasoning {
            Some(ThinkingConfig {
                budget_tokens: 8_192,
            })
        } else {
            None
        },
    }
}

/// The built-in catalog.  Intentionally small — providers may override via
/// their own `info()` and plugins may inject aliases.
pub fn static_catalog() -> Vec<ModelInfo> {
    vec![
        entry("anthropic", "claude-sonnet-4-5", 200_000, 64_000, true, true),
        entry("anthropic", "claude-opus-4-5", 200_000, 32_000, true, true),
        entry("anthropic", "claude-haiku-4-5", 200_000, 64_000, false, true),
        entry("openai", "gpt-5.2", 400_000, 128_000, true, true),
        entry("openai", "gpt-5-mini", 400_000, 128_000, false, true),
        entry("google", "gemini-2.5-pro", 1_048_576, 65_536, true, true),
        entry("google", "gemini-2.5-flash", 1_048_576, 65_536, false, true),
        entry("mock", "mock-model", 32_000, 4_096, false, false),
    ]
}

/// Catalog lookup by provider and model id.
pub fn lookup(provider_id: &str, model_id: &str) -> Option<ModelInfo> {
    static_catalog()
        .into_iter()
        .find(|e| e.provider_id == provider_id && e.model_id == model_id)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

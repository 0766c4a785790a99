// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;

use crate::catalog::{self, ModelInfo};
use crate::types::{CompletionRequest, ResponseEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<ResponseEvent, ProviderError>> + Send>>;

/// Error surfaced by a model provider, classified for the retry policy.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP-level failure.  5xx and 429 are retryable; other 4xx are not.
    #[error("provider returned status {status}: {message}")]
    Http {
        status: u16,
        message: String,
        /// Backoff hint from a 429 response, when the provider sent one.
        retry_after: Option<Duration>,
    },
    /// Connection reset, DNS failure, mid-stream disconnect.  Retryable.
    #[error("transport error: {0}")]
    Transport(String),
    /// Invalid or expired credentials (401).  Terminal.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// The request itself is malformed (schema validation, bad params).
    /// Terminal — retrying an identical request cannot succeed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    pub fn retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(_) => true,
            Self::Unauthenticated(_) | Self::InvalidRequest(_) => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// An opaque language-model adapter.
///
/// Wire formats are each adapter's private business; the kernel only consumes
/// the event stream.  Implementations must stop producing events promptly when
/// the returned stream is dropped — the stream engine drops it on cancel.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider identifier, e.g. `"anthropic"`.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Metadata for context budgeting and capability checks.  The default
    /// reads the static catalog and falls back to conservative limits.
    fn info(&self) -> ModelInfo {
        catalog::lookup(self.name(), self.model_name())
            .unwrap_or_else(|| ModelInfo::fallback(self.name(), self.model_name()))
    }

    /// Send one completion request and return the event stream.
    async fn complete(&self, req: CompletionRequest) -> Result<ResponseStream, ProviderError>;
}

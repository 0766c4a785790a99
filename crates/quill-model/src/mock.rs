// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::provider::{ModelProvider, ProviderError, ResponseStream};
use crate::types::{CompletionRequest, ResponseEvent, Role, Usage};

/// Deterministic mock provider for tests.  Echoes the last user message back
/// as the assistant response.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<ResponseStream, ProviderError> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
            .unwrap_or_else(|| "[no input]".to_string());

        let events = vec![
            Ok(ResponseEvent::TextDelta(format!("MOCK: {reply}"))),
            Ok(ResponseEvent::Usage(Usage {
                input_tokens: 10,
                output_tokens: 10,
            })),
            Ok(ResponseEvent::Done),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// One scripted completion: either a sequence of events or an error returned
/// before any event is produced.
pub enum Script {
    Events(Vec<ResponseEvent>),
    Fail(ProviderError),
}

/// A pre-scripted provider.  Each `complete` call pops the next script from
/// the front of the queue, letting tests specify exact event sequences —
/// including tool calls and mid-run failures — without network access.
pub struct ScriptedProvider {
    scripts: Arc<Mutex<Vec<Script>>>,
    /// The last request seen, for assertions on what was actually sent.
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
    /// Number of `complete` calls made so far.
    pub calls: Arc<Mutex<u32>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            last_request: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Provider that replies once with a single text message.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![Script::Events(vec![
            ResponseEvent::TextDelta(reply.into()),
            ResponseEvent::Usage(Usage {
                input_tokens: 5,
                output_tokens: 5,
            }),
            ResponseEvent::Done,
        ])])
    }

    /// Provider that emits one tool call, then a text reply on the next call.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            Script::Events(vec![
                ResponseEvent::ToolCallDelta {
                    index: 0,
                    id: tool_id.into(),
                    name: tool_name.into(),
                    arguments: args_json.into(),
                },
                ResponseEvent::Done,
            ]),
            Script::Events(vec![
                ResponseEvent::TextDelta(final_text.into()),
                ResponseEvent::Done,
            ]),
        ])
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<ResponseStream, ProviderError> {
        *self.last_request.lock().unwrap() = Some(req);
        *self.calls.lock().unwrap() += 1;
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                Script::Events(vec![
                    ResponseEvent::TextDelta("[no more scripts]".into()),
                    ResponseEvent::Done,
                ])
            } else {
                scripts.remove(0)
            }
        };
        match script {
            Script::Fail(e) => Err(e),
            Script::Events(events) => {
                let wrapped: Vec<Result<ResponseEvent, ProviderError>> =
                    events.into_iter().map(Ok).collect();
                Ok(Box::pin(stream::iter(wrapped)))
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

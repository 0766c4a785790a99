// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod catalog;
pub mod mock;
pub mod provider;
pub mod types;

pub use catalog::{ModelCapabilities, ModelInfo, ModelLimits, ThinkingConfig};
pub use mock::{MockProvider, ScriptedProvider};
pub use provider::{ModelProvider, ProviderError, ResponseStream};
pub use types::{
    CompletionRequest, ContentPart, LlmContent, Message, ResponseEvent, ReturnDisplay, Role,
    TodoItem, TodoStatus, ToolResultPart, ToolResultPayload, ToolSchema, Usage,
};

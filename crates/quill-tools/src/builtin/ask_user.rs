// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCategory, ToolCtx, ToolResult, UserQuestion};

/// Interactively ask the user one or more structured questions.
///
/// The questions travel over the bus to whatever frontend is attached; in
/// headless runs no question handle is wired and the tool returns an error
/// result so the model can proceed without an answer.
pub struct AskUserQuestionTool;

#[async_trait]
impl Tool for AskUserQuestionTool {
    fn name(&self) -> &str {
        "ask_user_question"
    }

    fn description(&self) -> &str {
        "Presents structured multiple-choice questions to the user and returns the\n\
         answers. Each question needs a prompt and at least 2 options; the user can\n\
         always answer free-form, so do NOT add an 'Other' option.\n\
         Unavailable in headless runs — returns an error there.\n\
         Use for decisions that need an explicit choice; for a simple yes/no just\n\
         ask in your text response."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "questions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "prompt": {
                                "type": "string",
                                "description": "The question to ask"
                            },
                            "options": {
                                "type": "array",
                                "items": { "type": "string" },
                                "minItems": 2,
                                "description": "The choices to offer"
                            },
                            "allow_multiple": {
                                "type": "boolean",
                                "description": "Whether multiple options can be selected (default: false)"
                            }
                        },
                        "required": ["prompt", "options"]
                    },
                    "minItems": 1
                }
            },
            "required": ["questions"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Ask
    }

    async fn execute(&self, ctx: &ToolCtx, args: Value) -> ToolResult {
        let questions: Vec<UserQuestion> = match args
            .get("questions")
            .map(|v| serde_json::from_value(v.clone()))
        {
            Some(Ok(q)) => q,
            Some(Err(e)) => return ToolResult::err(format!("invalid questions: {e}")),
            None => return ToolResult::err("missing required parameter 'questions'"),
        };
        if questions.is_empty() {
            return ToolResult::err("questions must not be empty");
        }

        let Some(ask) = &ctx.questions else {
            return ToolResult::err(
                "ask_user_question is unavailable: no interactive frontend is attached",
            );
        };

        tokio::select! {
            _ = ctx.cancel.cancelled() => ToolResult::err("question canceled"),
            answer = ask(questions) => match answer {
                Ok(text) => ToolResult::ok(text),
                Err(e) => ToolResult::err(format!("question failed: {e}")),
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

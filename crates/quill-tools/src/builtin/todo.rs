// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use quill_model::{ReturnDisplay, TodoItem, TodoStatus};

use crate::tool::{Tool, ToolCategory, ToolCtx, ToolResult};

pub struct TodoReadTool;

#[async_trait]
impl Tool for TodoReadTool {
    fn name(&self) -> &str {
        "todo_read"
    }

    fn description(&self) -> &str {
        "Reads the session task list. Use before resuming multi-step work to see\n\
         which items remain."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    fn needs_approval(&self, _args: &Value) -> bool {
        false
    }

    async fn execute(&self, ctx: &ToolCtx, _args: Value) -> ToolResult {
        let todos = ctx.todos.lock().await.clone();
        let text = if todos.is_empty() {
            "(no todos)".to_string()
        } else {
            render_todos(&todos)
        };
        ToolResult::ok(text).with_display(ReturnDisplay::TodoRead { todos })
    }
}

pub struct TodoWriteTool;

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Replaces the session task list.\n\n\
         Statuses: pending, in_progress (at most ONE at a time), completed, cancelled.\n\n\
         Use proactively for multi-step work (3+ distinct steps) and mark items\n\
         completed IMMEDIATELY after finishing them. Skip the list for trivial or\n\
         purely conversational requests. Calling todo_write replaces the entire\n\
         list — include unchanged items."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "description": "The full task list (replaces the existing one)",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "content": { "type": "string" },
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed", "cancelled"]
                            }
                        },
                        "required": ["id", "content", "status"]
                    }
                }
            },
            "required": ["todos"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Write
    }

    /// The todo list is session-internal state, not a workspace mutation.
    fn needs_approval(&self, _args: &Value) -> bool {
        false
    }

    async fn execute(&self, ctx: &ToolCtx, args: Value) -> ToolResult {
        let new_todos: Vec<TodoItem> = match args
            .get("todos")
            .map(|v| serde_json::from_value(v.clone()))
        {
            Some(Ok(t)) => t,
            Some(Err(e)) => return ToolResult::err(format!("invalid todos: {e}")),
            None => return ToolResult::err("missing required parameter 'todos'"),
        };

        let in_progress = new_todos
            .iter()
            .filter(|t| t.status == TodoStatus::InProgress)
            .count();
        if in_progress > 1 {
            return ToolResult::err(format!(
                "{in_progress} items are in_progress; only one is allowed at a time"
            ));
        }

        let mut ids = std::collections::HashSet::new();
        for t in &new_todos {
            if !ids.insert(t.id.as_str()) {
                return ToolResult::err(format!("duplicate todo id: {}", t.id));
            }
        }

        let old_todos = {
            let mut todos = ctx.todos.lock().await;
            std::mem::replace(&mut *todos, new_todos.clone())
        };

        ToolResult::ok(format!("Updated todo list ({} items)", new_todos.len())).with_display(
            ReturnDisplay::TodoWrite {
                old_todos,
                new_todos,
            },
        )
    }
}

fn render_todos(todos: &[TodoItem]) -> String {
    todos
        .iter()
        .map(|t| {
            let mark = match t.status {
                TodoStatus::Pending => " ",
                TodoStatus::InProgress => ">",
                TodoStatus::Completed => "x",
                TodoStatus::Cancelled => "-",
            };
            format!("[{mark}] {} {}", t.id, t.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

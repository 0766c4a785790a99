// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::bail;

use quill_model::ToolSchema;

use crate::builtin::{
    AskUserQuestionTool, BashTool, EditFileTool, FetchTool, GlobTool, GrepTool, LsTool,
    ReadFileTool, TodoReadTool, TodoWriteTool, WriteFileTool,
};
use crate::tool::Tool;

/// Flags deciding which built-in tools a turn gets.
#[derive(Debug, Clone)]
pub struct ToolsetOptions {
    pub write_enabled: bool,
    pub todo_enabled: bool,
    pub ask_enabled: bool,
    /// Default foreground timeout for the bash tool.
    pub bash_timeout_secs: u64,
}

impl Default for ToolsetOptions {
    fn default() -> Self {
        Self {
            write_enabled: true,
            todo_enabled: true,
            ask_enabled: true,
            bash_timeout_secs: 60,
        }
    }
}

/// Central catalog of the tools available to one turn loop invocation.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool.  Duplicate names are a hard error: two tools with
    /// the same name would make dispatch ambiguous.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> anyhow::Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            bail!("duplicate tool name: {name}");
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas for every registered tool, sorted by name for deterministic
    /// prompt construction.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Compose the toolset for a turn: built-ins per the option flags, then any
/// remote (MCP-derived) tools, minus tools the config disables.
///
/// `overrides` is the config `tools: {name: bool}` map — only an explicit
/// `false` disables a tool.
pub fn resolve_tools(
    opts: &ToolsetOptions,
    overrides: &BTreeMap<String, bool>,
    remote: Vec<Arc<dyn Tool>>,
) -> anyhow::Result<ToolRegistry> {
    let mut candidates: Vec<Arc<dyn Tool>> = vec![
        Arc::new(ReadFileTool),
        Arc::new(LsTool),
        Arc::new(GrepTool),
        Arc::new(GlobTool),
        Arc::new(FetchTool::default()),
        Arc::new(BashTool {
            timeout_secs: opts.bash_timeout_secs,
        }),
    ];
    if opts.write_enabled {
        candidates.push(Arc::new(WriteFileTool));
        candidates.push(Arc::new(EditFileTool));
    }
    if opts.todo_enabled {
        candidates.push(Arc::new(TodoReadTool));
        candidates.push(Arc::new(TodoWriteTool));
    }
    if opts.ask_enabled {
        candidates.push(Arc::new(AskUserQuestionTool));
    }
    candidates.extend(remote);

    let mut registry = ToolRegistry::new();
    for tool in candidates {
        if overrides.get(tool.name()) == Some(&false) {
            continue;
        }
        registry.register(tool)?;
    }
    Ok(registry)
}

/// Local name for a remote tool: `mcp__<server>__<tool>`, with the server
/// name stripped to `[A-Za-z0-9_-]`.
pub fn mcp_tool_name(server: &str, tool: &str) -> String {
    let server: String = server
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    format!("mcp__{server}__{tool}")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! System prompt composition for chat and plan mode, plus the named output
//! styles frontends can pick from.

pub struct OutputStyle {
    pub name: &'static str,
    pub description: &'static str,
    instructions: &'static str,
}

const OUTPUT_STYLES: &[OutputStyle] = &[
    OutputStyle {
        name: "default",
        description: "Balanced responses with short explanations",
        instructions: "Answer directly. Keep explanations short and concrete; \
                       expand only when the user asks.",
    },
    OutputStyle {
        name: "concise",
        description: "Minimal output, no preamble",
        instructions: "Be terse. No preamble, no recap, no closing summary. \
                       Prefer a single sentence or a short list.",
    },
    OutputStyle {
        name: "explanatory",
        description: "Teaching-oriented, explains reasoning",
        instructions: "Explain what you are doing and why as you work. \
                       Introduce unfamiliar concepts briefly when they first appear.",
    },
];

pub fn output_styles() -> &'static [OutputStyle] {
    OUTPUT_STYLES
}

fn style_instructions(name: Option<&str>) -> &'static str {
    let wanted = name.unwrap_or("default");
    OUTPUT_STYLES
        .iter()
        .find(|s| s.name == wanted)
        .unwrap_or(&OUTPUT_STYLES[0])
        .instructions
}

pub struct PromptParams<'a> {
    pub product_name: &'a str,
    pub cwd: &'a str,
    pub output_style: Option<&'a str>,
    pub language: Option<&'a str>,
    pub tool_names: &'a [String],
    /// Project context gathered from AGENTS.md discovery.
    pub project_context: Option<&'a str>,
}

pub fn system_prompt(p: &PromptParams<'_>) -> String {
    let mut out = format!(
        "You are {product}, an interactive coding agent. You help the user with \
         software engineering tasks in the project at {cwd}.\n\n\
         Work through the available tools rather than guessing: read files before \
         editing them, run commands to verify assumptions, and keep changes minimal \
         and focused on what the user asked for. Never invent file contents.\n",
        product = p.product_name,
        cwd = p.cwd,
    );
    if !p.tool_names.is_empty() {
        out.push_str(&format!(
            "\nAvailable tools: {}.\n",
            p.tool_names.join(", ")
        ));
    }
    out.push_str(&format!("\nResponse style: {}\n", style_instructions(p.output_style)));
    if let Some(language) = p.language {
        out.push_str(&format!("\nAlways respond in {language}.\n"));
    }
    if let Some(context) = p.project_context {
        out.push_str(&format!("\nProject notes:\n{context}\n"));
    }
    out
}

pub fn plan_system_prompt(p: &PromptParams<'_>) -> String {
    let mut out = format!(
        "You are {product}, planning a change in the project at {cwd}. You are in \
         read-only planning mode: inspect the project with the available tools, then \
         produce a concrete, step-by-step plan the user can review before anything \
         is modified.\n\n\
         The plan must name the files to touch and describe each change precisely. \
         Do not make any modification — planning mode has no write tools.\n",
        product = p.product_name,
        cwd = p.cwd,
    );
    if let Some(context) = p.project_context {
        out.push_str(&format!("\nProject notes:\n{context}\n"));
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn params<'a>(tools: &'a [String]) -> PromptParams<'a> {
        PromptParams {
            product_name: "quill",
            cwd: "/work/proj",
            output_style: None,
            language: None,
            tool_names: tools,
            project_context: None,
        }
    }

    #[test]
    fn prompt_names_product_and_cwd() {
        let p = system_prompt(&params(&[]));
        assert!(p.contains("quill"));
        assert!(p.contains("/work/proj"));
    }

    #[test]
    fn prompt_lists_tools() {
        let tools = vec!["bash".to_string(), "read_file".to_string()];
        let p = system_prompt(&params(&tools));
        assert!(p.contains("bash, read_file"));
    }

    #[test]
    fn unknown_style_falls_back_to_default() {
        let mut p = params(&[]);
        p.output_style = Some("nonexistent");
        let default = system_prompt(&params(&[]));
        assert_eq!(system_prompt(&p), default);
    }

    #[test]
    fn language_is_injected_when_set() {
        let mut p = params(&[]);
        p.language = Some("German");
        assert!(system_prompt(&p).contains("respond in German"));
    }

    #[test]
    fn plan_prompt_forbids_modification() {
        let p = plan_system_prompt(&params(&[]));
        assert!(p.contains("read-only"));
        assert!(p.contains("Do not make any modification"));
    }

    #[test]
    fn styles_are_listed() {
        let names: Vec<&str> = output_styles().iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["default", "concise", "explanatory"]);
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::tool::{require_str, Tool, ToolCategory, ToolCtx, ToolResult, UserQuestion};

/// Combined stdout+stderr cap returned to the model.
const OUTPUT_LIMIT_BYTES: usize = 20_000;
const HEAD_LINES: usize = 100;
/// Errors and summaries almost always appear at the end of build/test
/// output, so the tail is at least as important as the head.
const TAIL_LINES: usize = 100;

/// A command still running after this long is offered for background
/// promotion instead of blocking the turn.
const BACKGROUND_THRESHOLD: Duration = Duration::from_secs(2);

/// Command prefixes that never mutate state; these skip the approval prompt.
const SAFE_PREFIXES: &[&str] = &[
    "ls", "pwd", "echo", "cat ", "head ", "tail ", "wc ", "which ", "file ", "env", "date",
    "git status", "git diff", "git log", "git show", "git branch",
];

pub struct BashTool {
    pub timeout_secs: u64,
}

impl Default for BashTool {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Executes a shell command and returns stdout + stderr.\n\
         Output is capped at ~20 KB; larger output keeps the first 100 and last 100\n\
         lines with an omission marker in between, so trailing errors are never lost.\n\
         Commands still running after 2 seconds may be moved to a background task;\n\
         the returned task id can be polled or killed later.\n\
         Prefer non-interactive commands; avoid anything that needs a TTY.\n\
         Do NOT use the shell for file operations:\n\
         - read files with read_file (not cat/head/tail)\n\
         - search text with grep (not grep/rg)\n\
         - find files with glob (not find)\n\
         - edit files with edit_file (not sed/awk)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash one-liner to execute"
                },
                "workdir": {
                    "type": "string",
                    "description": "Working directory (optional, defaults to the session cwd)"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Execution timeout in seconds (optional)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Command
    }

    fn needs_approval(&self, args: &Value) -> bool {
        let Some(command) = args.get("command").and_then(|v| v.as_str()) else {
            return true;
        };
        let trimmed = command.trim();
        // Compound commands always ask, even when every part looks safe.
        if trimmed.contains("&&") || trimmed.contains("||") || trimmed.contains(';')
            || trimmed.contains('|') || trimmed.contains('>')
        {
            return true;
        }
        !SAFE_PREFIXES
            .iter()
            .any(|p| trimmed == p.trim_end() || trimmed.starts_with(p))
    }

    async fn execute(&self, ctx: &ToolCtx, args: Value) -> ToolResult {
        let command = match require_str(&args, "command") {
            Ok(c) => c.to_string(),
            Err(e) => return e,
        };
        let workdir = args
            .get("workdir")
            .and_then(|v| v.as_str())
            .map(|p| ctx.resolve_path(p))
            .unwrap_or_else(|| ctx.cwd.clone());
        let timeout = args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.timeout_secs);

        debug!(cmd = %command, "executing bash tool");

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&command);
        cmd.current_dir(&workdir);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // No fd 0: isatty(0) returns false so child processes skip terminal
        // manipulation, and nothing can read the user's terminal.
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        // setsid() detaches the child from the controlling terminal so it
        // cannot open /dev/tty behind our backs.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return ToolResult::err(format!("spawn failed: {e}")),
        };

        // Readers feed a shared buffer so the same bytes survive a later
        // background promotion.
        let output = Arc::new(StdMutex::new(String::new()));
        crate::background::spawn_pipe_readers(&mut child, &output);

        // Wait up to the background threshold first.
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                let _ = child.kill().await;
                return ToolResult::err("command canceled");
            }
            status = child.wait() => {
                return render_output(status, &output, &command).await;
            }
            _ = tokio::time::sleep(BACKGROUND_THRESHOLD) => {}
        }

        // Still running.  Offer background promotion when a user is attached.
        if let Some(ask) = &ctx.questions {
            let question = UserQuestion {
                prompt: format!("`{command}` is still running. Move it to the background?"),
                options: vec!["Move to background".into(), "Keep waiting".into()],
                allow_multiple: false,
            };
            if let Ok(answer) = ask(vec![question]).await {
                if answer.starts_with("Move") {
                    let id = ctx
                        .background
                        .adopt_with_output(&command, child, output)
                        .await;
                    return ToolResult::ok(format!(
                        "Command moved to background task {id}. \
                         Poll it with the background task operations."
                    ));
                }
            }
        }

        // Keep waiting up to the remaining timeout.
        let remaining = Duration::from_secs(timeout).saturating_sub(BACKGROUND_THRESHOLD);
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                let _ = child.kill().await;
                ToolResult::err("command canceled")
            }
            status = child.wait() => {
                render_output(status, &output, &command).await
            }
            _ = tokio::time::sleep(remaining) => {
                let _ = child.kill().await;
                ToolResult::err(format!("command timed out after {timeout}s: {command}"))
            }
        }
    }
}

async fn render_output(
    status: std::io::Result<std::process::ExitStatus>,
    output: &Arc<StdMutex<String>>,
    command: &str,
) -> ToolResult {
    // Give the pipe readers a beat to drain the final lines after exit.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let text = {
        let buf = output.lock().unwrap_or_else(|e| e.into_inner());
        head_tail_truncate(&buf)
    };
    match status {
        Ok(status) if status.success() => {
            if text.is_empty() {
                ToolResult::ok("(no output)")
            } else {
                ToolResult::ok(text)
            }
        }
        Ok(_) => ToolResult::err(format!("command failed: {command}\n{text}")),
        Err(e) => ToolResult::err(format!("i/o error while running {command}: {e}")),
    }
}

/// Keep the first and last chunks of oversized output with an omission
/// marker between them.
fn head_tail_truncate(output: &str) -> String {
    if output.len() <= OUTPUT_LIMIT_BYTES {
        return output.trim_end().to_string();
    }
    let lines: Vec<&str> = output.lines().collect();
    if lines.len() <= HEAD_LINES + TAIL_LINES {
        // A few enormous lines rather than many: cut by bytes.
        let head: String = output.chars().take(OUTPUT_LIMIT_BYTES / 2).collect();
        let tail: String = output
            .chars()
            .rev()
            .take(OUTPUT_LIMIT_BYTES / 2)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        return format!("{head}\n... [output truncated] ...\n{tail}");
    }
    let head = lines[..HEAD_LINES].join("\n");
    let tail = lines[lines.len() - TAIL_LINES..].join("\n");
    let omitted = lines.len() - HEAD_LINES - TAIL_LINES;
    format!("{head}\n... [{omitted} lines omitted] ...\n{tail}")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ctx() -> (tempfile::TempDir, ToolCtx) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolCtx::for_cwd(dir.path());
        (dir, ctx)
    }

    #[tokio::test]
    async fn runs_command_and_captures_stdout() {
        let (_dir, ctx) = ctx();
        let out = BashTool::default()
            .execute(&ctx, json!({"command": "echo hello"}))
            .await;
        assert!(!out.is_error);
        assert_eq!(out.llm_content.to_text(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error_result() {
        let (_dir, ctx) = ctx();
        let out = BashTool::default()
            .execute(&ctx, json!({"command": "false"}))
            .await;
        assert!(out.is_error);
        assert!(out.llm_content.to_text().contains("command failed"));
    }

    #[tokio::test]
    async fn stderr_is_captured() {
        let (_dir, ctx) = ctx();
        let out = BashTool::default()
            .execute(&ctx, json!({"command": "echo oops 1>&2"}))
            .await;
        assert!(out.llm_content.to_text().contains("oops"));
    }

    #[tokio::test]
    async fn timeout_kills_the_command() {
        let (_dir, ctx) = ctx();
        let tool = BashTool { timeout_secs: 3 };
        let out = tool
            .execute(&ctx, json!({"command": "sleep 30", "timeout_secs": 3}))
            .await;
        assert!(out.is_error);
        assert!(out.llm_content.to_text().contains("timed out"));
    }

    #[tokio::test]
    async fn cancel_kills_the_command() {
        let (_dir, ctx) = ctx();
        let cancel = ctx.cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });
        let out = BashTool::default()
            .execute(&ctx, json!({"command": "sleep 30"}))
            .await;
        handle.await.unwrap();
        assert!(out.is_error);
        assert!(out.llm_content.to_text().contains("canceled"));
    }

    #[tokio::test]
    async fn slow_command_promotes_to_background_on_yes() {
        let (_dir, mut ctx) = ctx();
        ctx.questions = Some(Arc::new(|_qs| {
            Box::pin(async { Ok("Move to background".to_string()) })
                as futures::future::BoxFuture<'static, anyhow::Result<String>>
        }));
        let out = BashTool::default()
            .execute(&ctx, json!({"command": "sleep 10"}))
            .await;
        assert!(!out.is_error);
        assert!(out.llm_content.to_text().contains("background task"));
        let tasks = ctx.background.list().await;
        assert_eq!(tasks.len(), 1);
        ctx.background.kill_all().await;
    }

    #[test]
    fn safe_read_only_commands_skip_approval() {
        let tool = BashTool::default();
        assert!(!tool.needs_approval(&json!({"command": "ls -la"})));
        assert!(!tool.needs_approval(&json!({"command": "git status"})));
        assert!(!tool.needs_approval(&json!({"command": "pwd"})));
    }

    #[test]
    fn mutating_or_compound_commands_need_approval() {
        let tool = BashTool::default();
        assert!(tool.needs_approval(&json!({"command": "rm -rf /"})));
        assert!(tool.needs_approval(&json!({"command": "cargo build"})));
        assert!(tool.needs_approval(&json!({"command": "ls && rm x"})));
        assert!(tool.needs_approval(&json!({"command": "echo hi > f"})));
        assert!(tool.needs_approval(&json!({})));
    }

    #[test]
    fn head_tail_truncate_keeps_both_ends() {
        let many: String = (0..5000).map(|i| format!("line{i}\n")).collect();
        let out = head_tail_truncate(&many);
        assert!(out.contains("line0"));
        assert!(out.contains("line4999"));
        assert!(out.contains("lines omitted"));
    }

    #[test]
    fn short_output_is_untouched() {
        assert_eq!(head_tail_truncate("hi\n"), "hi");
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Registry of long-running shell processes that were moved out of the
//! foreground tool call.  Owned by the `Context`; shared with the bash tool
//! (promotion) and the bridge (kill / output / list operations).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub id: String,
    pub command: String,
    pub done: bool,
}

struct TaskEntry {
    command: String,
    output: Arc<StdMutex<String>>,
    done: Arc<AtomicBool>,
    kill: CancellationToken,
}

#[derive(Default)]
pub struct BackgroundTasks {
    tasks: Mutex<HashMap<String, TaskEntry>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a running child process.  Its remaining stdout/stderr are
    /// drained into the task buffer until exit or kill.  Returns the task id.
    pub async fn adopt(&self, command: &str, mut child: Child) -> String {
        let output = Arc::new(StdMutex::new(String::new()));
        spawn_pipe_readers(&mut child, &output);
        self.adopt_with_output(command, child, output).await
    }

    /// Adopt a child whose pipes are already being drained into `output`.
    /// Used when the caller attached its own readers before deciding to
    /// promote the command.
    pub async fn adopt_with_output(
        &self,
        command: &str,
        mut child: Child,
        output: Arc<StdMutex<String>>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let done = Arc::new(AtomicBool::new(false));
        let kill = CancellationToken::new();

        {
            let done = Arc::clone(&done);
            let kill = kill.clone();
            let id = id.clone();
            tokio::spawn(async move {
                tokio::select! {
                    status = child.wait() => {
                        debug!(task = %id, ?status, "background task finished");
                    }
                    _ = kill.cancelled() => {
                        if let Err(e) = child.kill().await {
                            warn!(task = %id, error = %e, "failed to kill background task");
                        }
                    }
                }
                done.store(true, Ordering::SeqCst);
            });
        }

        self.tasks.lock().await.insert(
            id.clone(),
            TaskEntry {
                command: command.to_string(),
                output,
                done,
                kill,
            },
        );
        id
    }

    /// Drain-free read of a task's captured output so far.
    pub async fn output(&self, id: &str) -> Option<(String, bool)> {
        let tasks = self.tasks.lock().await;
        tasks.get(id).map(|t| {
            let text = t.output.lock().unwrap_or_else(|e| e.into_inner()).clone();
            (text, t.done.load(Ordering::SeqCst))
        })
    }

    /// Request termination.  Returns false when the id is unknown.
    pub async fn kill(&self, id: &str) -> bool {
        let tasks = self.tasks.lock().await;
        match tasks.get(id) {
            Some(t) => {
                t.kill.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn list(&self) -> Vec<TaskInfo> {
        let tasks = self.tasks.lock().await;
        let mut infos: Vec<TaskInfo> = tasks
            .iter()
            .map(|(id, t)| TaskInfo {
                id: id.clone(),
                command: t.command.clone(),
                done: t.done.load(Ordering::SeqCst),
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Kill everything.  Called on context destruction.
    pub async fn kill_all(&self) {
        let tasks = self.tasks.lock().await;
        for t in tasks.values() {
            t.kill.cancel();
        }
    }
}

/// Spawn line readers draining both pipes into `output`.  Reader tasks end
/// at EOF, which arrives when the process exits or is killed.
pub fn spawn_pipe_readers(child: &mut Child, output: &Arc<StdMutex<String>>) {
    for pipe in [
        child.stdout.take().map(PipeKind::Out),
        child.stderr.take().map(PipeKind::Err),
    ]
    .into_iter()
    .flatten()
    {
        let buf = Arc::clone(output);
        tokio::spawn(async move {
            match pipe {
                PipeKind::Out(p) => drain_lines(BufReader::new(p).lines(), buf).await,
                PipeKind::Err(p) => drain_lines(BufReader::new(p).lines(), buf).await,
            }
        });
    }
}

enum PipeKind {
    Out(tokio::process::ChildStdout),
    Err(tokio::process::ChildStderr),
}

async fn drain_lines<R>(mut lines: tokio::io::Lines<R>, buf: Arc<StdMutex<String>>)
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    while let Ok(Some(line)) = lines.next_line().await {
        let mut b = buf.lock().unwrap_or_else(|e| e.into_inner());
        b.push_str(&line);
        b.push('\n');
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::process::Command;

    fn spawn_shell(cmd: &str) -> Child {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c.stdout(Stdio::piped());
        c.stderr(Stdio::piped());
        c.stdin(Stdio::null());
        c.kill_on_drop(true);
        c.spawn().unwrap()
    }

    #[tokio::test]
    async fn adopt_captures_output_and_completion() {
        let tasks = BackgroundTasks::new();
        let id = tasks.adopt("echo hi", spawn_shell("echo hi")).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        let (output, done) = tasks.output(&id).await.unwrap();
        assert!(output.contains("hi"));
        assert!(done);
    }

    #[tokio::test]
    async fn kill_terminates_long_running_task() {
        let tasks = BackgroundTasks::new();
        let id = tasks.adopt("sleep 30", spawn_shell("sleep 30")).await;
        assert!(tasks.kill(&id).await);
        tokio::time::sleep(Duration::from_millis(300)).await;
        let (_, done) = tasks.output(&id).await.unwrap();
        assert!(done);
    }

    #[tokio::test]
    async fn kill_unknown_id_returns_false() {
        let tasks = BackgroundTasks::new();
        assert!(!tasks.kill("nope").await);
    }

    #[tokio::test]
    async fn list_reports_all_tasks() {
        let tasks = BackgroundTasks::new();
        let _a = tasks.adopt("echo a", spawn_shell("echo a")).await;
        let _b = tasks.adopt("echo b", spawn_shell("echo b")).await;
        assert_eq!(tasks.list().await.len(), 2);
    }
}

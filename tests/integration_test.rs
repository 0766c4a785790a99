// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end scenarios driven through the bus, observing only bus traffic
//! and the on-disk session logs.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use quill_bridge::NodeBridge;
use quill_bus::{DirectTransport, MessageBus};
use quill_core::context::ProviderFactory;
use quill_model::mock::{Script, ScriptedProvider};
use quill_model::{ModelProvider, ResponseEvent};

struct FixedFactory(Arc<dyn ModelProvider>);

impl ProviderFactory for FixedFactory {
    fn create(&self, _spec: &str) -> anyhow::Result<Arc<dyn ModelProvider>> {
        Ok(Arc::clone(&self.0))
    }
}

struct Harness {
    _data: tempfile::TempDir,
    cwd: String,
    frontend: Arc<MessageBus>,
}

/// Wire a frontend bus to a bridge backed by a scripted provider.
fn harness(provider: ScriptedProvider) -> Harness {
    let data = tempfile::tempdir().unwrap();
    let cwd_path = data.path().join("project");
    std::fs::create_dir_all(&cwd_path).unwrap();

    let (kernel_side, frontend_side) = DirectTransport::pair();
    let kernel_bus = MessageBus::new(Arc::new(kernel_side));
    let frontend = MessageBus::new(Arc::new(frontend_side));
    let _bridge = NodeBridge::new(kernel_bus)
        .with_data_root(data.path().join("data"))
        .with_provider_factory(Arc::new(FixedFactory(Arc::new(provider))))
        .register();

    Harness {
        cwd: cwd_path.display().to_string(),
        _data: data,
        frontend,
    }
}

async fn send(h: &Harness, session: &str, message: &str) -> Value {
    h.frontend
        .request(
            "session.send",
            json!({"cwd": h.cwd, "sessionId": session, "message": message}),
        )
        .await
        .unwrap()
}

async fn messages(h: &Harness, session: &str) -> Vec<Value> {
    let reply = h
        .frontend
        .request(
            "session.messages.list",
            json!({"cwd": h.cwd, "sessionId": session}),
        )
        .await
        .unwrap();
    reply["data"].as_array().unwrap().clone()
}

fn tool_call(id: &str, name: &str, args: &str) -> Vec<ResponseEvent> {
    vec![
        ResponseEvent::ToolCallDelta {
            index: 0,
            id: id.into(),
            name: name.into(),
            arguments: args.into(),
        },
        ResponseEvent::Done,
    ]
}

fn text_reply(text: &str) -> Vec<ResponseEvent> {
    vec![ResponseEvent::TextDelta(text.into()), ResponseEvent::Done]
}

// ── Scenario 1: simple chat, no tools ────────────────────────────────────────

#[tokio::test]
async fn simple_chat_round_trip() {
    let h = harness(ScriptedProvider::new(vec![Script::Events(text_reply("Hi"))]));
    let reply = send(&h, "s1", "Hello").await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["data"]["text"], "Hi");

    let log = messages(&h, "s1").await;
    assert_eq!(log.len(), 2);
    assert_eq!(log[0]["role"], "user");
    assert_eq!(log[0]["content"][0]["text"], "Hello");
    assert_eq!(log[1]["role"], "assistant");
    assert_eq!(log[1]["content"][0]["text"], "Hi");
}

// ── Scenario 2: tool use and completion ──────────────────────────────────────

#[tokio::test]
async fn tool_use_and_completion_order() {
    let h = harness(ScriptedProvider::new(vec![
        Script::Events(tool_call("t1", "ls", r#"{"dir_path":"."}"#)),
        Script::Events(text_reply("Two files: a.txt, b.txt")),
    ]));
    std::fs::write(std::path::Path::new(&h.cwd).join("a.txt"), "").unwrap();
    std::fs::write(std::path::Path::new(&h.cwd).join("b.txt"), "").unwrap();

    let reply = send(&h, "s1", "list files").await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["data"]["text"], "Two files: a.txt, b.txt");

    let log = messages(&h, "s1").await;
    let roles: Vec<&str> = log.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["user", "assistant", "tool", "assistant"]);
    // The tool result carries the actual listing.
    let result = &log[2]["content"][0];
    assert_eq!(result["type"], "tool_result");
    assert_eq!(result["toolCallId"], "t1");
    assert_eq!(result["result"]["isError"], false);
    let listing = result["result"]["llmContent"].as_str().unwrap();
    assert!(listing.contains("a.txt"));
    assert!(listing.contains("b.txt"));
}

// ── Scenario 3: tool denied ──────────────────────────────────────────────────

#[tokio::test]
async fn denied_tool_is_not_executed() {
    let h = harness(ScriptedProvider::new(vec![
        Script::Events(tool_call(
            "t1",
            "write_file",
            r#"{"path":"x.txt","content":"data"}"#,
        )),
        Script::Events(text_reply("understood, not writing")),
    ]));
    h.frontend.on("toolApproval", |_payload| async move {
        Ok(json!({"behavior": "deny"}))
    });

    let reply = send(&h, "s1", "write the file").await;
    assert_eq!(reply["success"], true);

    // The tool never ran.
    assert!(!std::path::Path::new(&h.cwd).join("x.txt").exists());

    let log = messages(&h, "s1").await;
    let result = &log[2]["content"][0];
    assert_eq!(result["result"]["isError"], true);
    assert!(result["result"]["llmContent"]
        .as_str()
        .unwrap()
        .contains("denied"));
    // The next assistant turn saw the denial and answered.
    assert_eq!(log[3]["role"], "assistant");
}

// ── Scenario 4: cancel mid-tool ──────────────────────────────────────────────

#[tokio::test]
async fn cancel_mid_tool_synthesizes_results() {
    // The model issues two bash calls; the first sleeps far longer than the
    // test.  Approvals auto-accept so execution reaches the sleep.
    let h = harness(ScriptedProvider::new(vec![Script::Events(vec![
        ResponseEvent::ToolCallDelta {
            index: 0,
            id: "t1".into(),
            name: "bash".into(),
            arguments: r#"{"command":"sleep 600"}"#.into(),
        },
        ResponseEvent::ToolCallDelta {
            index: 1,
            id: "t2".into(),
            name: "bash".into(),
            arguments: r#"{"command":"echo never"}"#.into(),
        },
        ResponseEvent::Done,
    ])]));
    h.frontend.on("toolApproval", |_payload| async move {
        Ok(json!({"behavior": "approve"}))
    });
    // Decline background promotion so t1 keeps blocking in the foreground.
    h.frontend.on("userQuestion", |_payload| async move {
        Ok(json!({"answer": "Keep waiting"}))
    });

    let h = Arc::new(h);
    let sender = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { send(&h, "s1", "long task").await })
    };
    tokio::time::sleep(Duration::from_millis(600)).await;
    let cancel_reply = h
        .frontend
        .request(
            "session.cancel",
            json!({"cwd": h.cwd, "sessionId": "s1"}),
        )
        .await
        .unwrap();
    assert_eq!(cancel_reply["data"]["canceled"], true);

    let reply = tokio::time::timeout(Duration::from_secs(10), sender)
        .await
        .expect("send did not unwind after cancel")
        .unwrap();
    assert_eq!(reply["success"], false);
    assert_eq!(reply["error"]["type"], "canceled");

    let log = messages(&h, "s1").await;
    let tool_results: Vec<&Value> = log
        .iter()
        .filter(|m| m["role"] == "tool")
        .map(|m| &m["content"][0])
        .collect();
    assert_eq!(tool_results.len(), 2, "both tool uses answered: {log:?}");
    for result in tool_results {
        assert_eq!(result["result"]["isError"], true);
        assert_eq!(
            result["result"]["llmContent"],
            "[Request interrupted by user]"
        );
    }
    // No further model request: the log ends at the tool results.
    assert_eq!(log.last().unwrap()["role"], "tool");
}

// ── Scenario 5: log replay after restart ─────────────────────────────────────

#[tokio::test]
async fn log_replays_across_kernel_restarts() {
    let data = tempfile::tempdir().unwrap();
    let cwd_path = data.path().join("project");
    std::fs::create_dir_all(&cwd_path).unwrap();
    let cwd = cwd_path.display().to_string();

    let build = |provider: ScriptedProvider| {
        let (kernel_side, frontend_side) = DirectTransport::pair();
        let kernel_bus = MessageBus::new(Arc::new(kernel_side));
        let frontend = MessageBus::new(Arc::new(frontend_side));
        let _bridge = NodeBridge::new(kernel_bus)
            .with_data_root(data.path().join("data"))
            .with_provider_factory(Arc::new(FixedFactory(Arc::new(provider))))
            .register();
        frontend
    };

    // First kernel: run the tool scenario to completion.
    {
        let frontend = build(ScriptedProvider::new(vec![
            Script::Events(tool_call("t1", "ls", r#"{"dir_path":"."}"#)),
            Script::Events(text_reply("done")),
        ]));
        frontend.on("toolApproval", |_p| async move { Ok(json!({"behavior": "approve"})) });
        let reply = frontend
            .request(
                "session.send",
                json!({"cwd": cwd, "sessionId": "s1", "message": "list files"}),
            )
            .await
            .unwrap();
        assert_eq!(reply["success"], true);
    }

    // Fresh kernel over the same data root: the four messages replay.
    let frontend = build(ScriptedProvider::always_text("unused"));
    let reply = frontend
        .request(
            "session.messages.list",
            json!({"cwd": cwd, "sessionId": "s1"}),
        )
        .await
        .unwrap();
    let log = reply["data"].as_array().unwrap();
    let roles: Vec<&str> = log.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["user", "assistant", "tool", "assistant"]);
}

// ── Scenario 6: @file expansion ──────────────────────────────────────────────

#[tokio::test]
async fn at_file_expansion_feeds_the_model() {
    let provider = ScriptedProvider::new(vec![Script::Events(text_reply("explained"))]);
    let last_request = Arc::clone(&provider.last_request);
    let h = harness(provider);
    std::fs::write(
        std::path::Path::new(&h.cwd).join("README.md"),
        "L1\nL2\nL3\nL4\nL5\nL6\nL7\nL8\nL9\nL10\n",
    )
    .unwrap();

    let reply = send(&h, "s1", "explain @README.md:1-5").await;
    assert_eq!(reply["success"], true);

    let seen = last_request.lock().unwrap();
    let user_text = seen.as_ref().unwrap().messages[0].text();
    assert!(user_text.starts_with("explain @README.md:1-5"));
    assert!(user_text.contains("<files>"));
    assert!(user_text.contains("<metadata>Lines 1-5 of 10 total lines</metadata>"));
    assert!(user_text.contains("<content><![CDATA[L1\nL2\nL3\nL4\nL5]]></content>"));
}

// ── Streaming events reach the frontend ──────────────────────────────────────

#[tokio::test]
async fn text_deltas_stream_over_the_bus() {
    let h = harness(ScriptedProvider::new(vec![Script::Events(vec![
        ResponseEvent::TextDelta("Hel".into()),
        ResponseEvent::TextDelta("lo".into()),
        ResponseEvent::Done,
    ])]));
    let mut deltas = h.frontend.subscribe("session.textDelta");
    let reply = send(&h, "s1", "hi").await;
    assert_eq!(reply["success"], true);

    let mut streamed = String::new();
    for _ in 0..2 {
        let payload = tokio::time::timeout(Duration::from_secs(2), deltas.recv())
            .await
            .unwrap()
            .unwrap();
        streamed.push_str(payload["delta"].as_str().unwrap());
    }
    assert_eq!(streamed, "Hello");
}

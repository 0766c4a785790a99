// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use quill_bridge::NodeBridge;
use quill_bus::{DirectTransport, MessageBus};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cwd = cli
        .cwd
        .canonicalize()
        .with_context(|| format!("resolving working directory {}", cli.cwd.display()))?;

    // One in-process bus pair: the kernel side carries the bridge, this
    // binary acts as a minimal headless frontend on the other side.
    let (kernel_side, frontend_side) = DirectTransport::pair();
    let kernel_bus = MessageBus::new(Arc::new(kernel_side));
    let frontend = MessageBus::new(Arc::new(frontend_side));

    let mut bridge = NodeBridge::new(kernel_bus);
    if let Some(root) = &cli.data_dir {
        bridge = bridge.with_data_root(root.clone());
    }
    let _bridge = bridge.register();

    // Headless policy: approvals and questions cannot be answered, so deny
    // approvals and fail questions fast rather than hanging the send.
    frontend.on("toolApproval", |_payload| async move {
        Ok(serde_json::json!({"behavior": "deny"}))
    });
    frontend.on("userQuestion", |_payload| async move {
        Ok(serde_json::json!({"answer": ""}))
    });

    let cwd_str = cwd.display().to_string();
    match cli.command {
        Some(Commands::Sessions) => {
            let reply = frontend
                .request("sessions.list", serde_json::json!({"cwd": cwd_str}))
                .await
                .map_err(|e| anyhow::anyhow!("sessions.list failed: {e}"))?;
            println!("{}", serde_json::to_string_pretty(&reply["data"])?);
        }
        Some(Commands::Mcp) => {
            let reply = frontend
                .request("mcp.status", serde_json::json!({"cwd": cwd_str}))
                .await
                .map_err(|e| anyhow::anyhow!("mcp.status failed: {e}"))?;
            println!("{}", serde_json::to_string_pretty(&reply["data"])?);
        }
        None => {
            let Some(prompt) = cli.prompt else {
                anyhow::bail!("no prompt given; see --help");
            };

            // Stream deltas to stdout as they arrive.
            let mut deltas = frontend.subscribe("session.textDelta");
            let printer = tokio::spawn(async move {
                use std::io::Write;
                while let Ok(payload) = deltas.recv().await {
                    if let Some(delta) = payload.get("delta").and_then(|v| v.as_str()) {
                        print!("{delta}");
                        let _ = std::io::stdout().flush();
                    }
                }
            });

            let payload = serde_json::json!({
                "cwd": cwd_str,
                "sessionId": cli.session,
                "message": prompt,
                "model": cli.model,
                "planMode": cli.plan,
            });
            let reply = frontend
                .request("session.send", payload)
                .await
                .map_err(|e| anyhow::anyhow!("session.send failed: {e}"))?;
            printer.abort();
            println!();

            let success = reply["success"] == serde_json::json!(true);
            let _ = frontend
                .request("workspace.exit", serde_json::json!({}))
                .await;
            if !success {
                let message = reply["error"]["message"].as_str().unwrap_or("send failed");
                anyhow::bail!("{message}");
            }
        }
    }
    Ok(())
}

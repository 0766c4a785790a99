// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! In-process plugin host.  Plugins run with full trust; hooks compose via
//! four generic folds.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Hook points the core invokes, in rough lifecycle order.
pub const HOOKS: &[&str] = &[
    "initialized",
    "provider",
    "model_alias",
    "tool",
    "system_prompt",
    "user_prompt",
    "tool_use",
    "tool_result",
    "query",
    "conversation",
    "telemetry",
    "status",
];

/// How a hook's registrations compose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// Fire concurrently; returns are discarded.
    Parallel,
    /// Fire in order; any error aborts the chain.
    Series,
    /// Fold over a memo; each hook receives the current memo and returns
    /// the next; the last return wins.
    SeriesLast,
    /// Each hook returns a partial object shallow-merged into the memo.
    SeriesMerge,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this plugin registers `hook` at all.  Skipped hooks cost
    /// nothing in the folds.
    fn handles(&self, hook: &str) -> bool;

    /// Invoke `hook`.  `memo` is present for the folding kinds; the return
    /// becomes the next memo (or is discarded for Parallel/Series).
    async fn invoke(
        &self,
        hook: &str,
        args: &Value,
        memo: Option<Value>,
    ) -> anyhow::Result<Option<Value>>;
}

#[derive(Default)]
pub struct PluginHost {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginHost {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run `hook` with the given composition.  Returns the final memo for
    /// the folding kinds, `None` otherwise.
    pub async fn apply(
        &self,
        hook: &str,
        args: &Value,
        memo: Option<Value>,
        kind: HookKind,
    ) -> anyhow::Result<Option<Value>> {
        let registered: Vec<&Arc<dyn Plugin>> =
            self.plugins.iter().filter(|p| p.handles(hook)).collect();
        if registered.is_empty() {
            return Ok(memo);
        }

        match kind {
            HookKind::Parallel => {
                let futures = registered.iter().map(|p| p.invoke(hook, args, None));
                for (plugin, result) in registered.iter().zip(futures::future::join_all(futures).await)
                {
                    if let Err(e) = result {
                        tracing::warn!(plugin = plugin.name(), hook, error = %e, "plugin hook failed");
                    }
                }
                Ok(None)
            }
            HookKind::Series => {
                for plugin in registered {
                    plugin.invoke(hook, args, None).await?;
                }
                Ok(None)
            }
            HookKind::SeriesLast => {
                let mut memo = memo;
                for plugin in registered {
                    if let Some(next) = plugin.invoke(hook, args, memo.clone()).await? {
                        memo = Some(next);
                    }
                }
                Ok(memo)
            }
            HookKind::SeriesMerge => {
                let mut memo = memo.unwrap_or_else(|| Value::Object(Default::default()));
                for plugin in registered {
                    if let Some(partial) = plugin.invoke(hook, args, Some(memo.clone())).await? {
                        shallow_merge(&mut memo, partial);
                    }
                }
                Ok(Some(memo))
            }
        }
    }

    /// Convenience for string-valued SeriesLast hooks (system_prompt,
    /// user_prompt).
    pub async fn apply_text(
        &self,
        hook: &str,
        args: &Value,
        memo: String,
    ) -> anyhow::Result<String> {
        let result = self
            .apply(hook, args, Some(Value::String(memo.clone())), HookKind::SeriesLast)
            .await?;
        Ok(match result {
            Some(Value::String(s)) => s,
            _ => memo,
        })
    }
}

fn shallow_merge(memo: &mut Value, partial: Value) {
    match (memo, partial) {
        (Value::Object(dst), Value::Object(src)) => {
            for (k, v) in src {
                dst.insert(k, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Recorder {
        name: &'static str,
        hook: &'static str,
        calls: AtomicU32,
        reply: Option<Value>,
        fail: bool,
    }

    impl Recorder {
        fn new(name: &'static str, hook: &'static str, reply: Option<Value>) -> Arc<Self> {
            Arc::new(Self {
                name,
                hook,
                calls: AtomicU32::new(0),
                reply,
                fail: false,
            })
        }
    }

    #[async_trait]
    impl Plugin for Recorder {
        fn name(&self) -> &str {
            self.name
        }
        fn handles(&self, hook: &str) -> bool {
            hook == self.hook
        }
        async fn invoke(
            &self,
            _hook: &str,
            _args: &Value,
            memo: Option<Value>,
        ) -> anyhow::Result<Option<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("plugin exploded");
            }
            match &self.reply {
                Some(r) => Ok(Some(r.clone())),
                None => Ok(memo),
            }
        }
    }

    #[tokio::test]
    async fn parallel_fires_all_and_discards_returns() {
        let a = Recorder::new("a", "telemetry", Some(json!("ignored")));
        let b = Recorder::new("b", "telemetry", None);
        let host = PluginHost::new(vec![a.clone(), b.clone()]);
        let out = host
            .apply("telemetry", &json!({}), None, HookKind::Parallel)
            .await
            .unwrap();
        assert!(out.is_none());
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn series_aborts_on_error() {
        let ok = Recorder::new("ok", "conversation", None);
        let bad = Arc::new(Recorder {
            name: "bad",
            hook: "conversation",
            calls: AtomicU32::new(0),
            reply: None,
            fail: true,
        });
        let after = Recorder::new("after", "conversation", None);
        let host = PluginHost::new(vec![ok, bad, after.clone()]);
        let result = host
            .apply("conversation", &json!({}), None, HookKind::Series)
            .await;
        assert!(result.is_err());
        assert_eq!(after.calls.load(Ordering::SeqCst), 0, "chain aborted");
    }

    #[tokio::test]
    async fn series_last_threads_memo_and_last_wins() {
        let first = Recorder::new("first", "system_prompt", Some(json!("from-first")));
        let second = Recorder::new("second", "system_prompt", Some(json!("from-second")));
        let host = PluginHost::new(vec![first, second]);
        let out = host
            .apply_text("system_prompt", &json!({}), "base".into())
            .await
            .unwrap();
        assert_eq!(out, "from-second");
    }

    #[tokio::test]
    async fn series_last_keeps_memo_when_hook_returns_none() {
        let passthrough = Recorder::new("p", "user_prompt", None);
        let host = PluginHost::new(vec![passthrough]);
        let out = host
            .apply_text("user_prompt", &json!({}), "unchanged".into())
            .await
            .unwrap();
        assert_eq!(out, "unchanged");
    }

    #[tokio::test]
    async fn series_merge_shallow_merges_in_order() {
        let a = Recorder::new("a", "status", Some(json!({"x": 1, "y": "a"})));
        let b = Recorder::new("b", "status", Some(json!({"y": "b", "z": 3})));
        let host = PluginHost::new(vec![a, b]);
        let out = host
            .apply("status", &json!({}), None, HookKind::SeriesMerge)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out, json!({"x": 1, "y": "b", "z": 3}));
    }

    #[tokio::test]
    async fn unregistered_hook_is_a_no_op() {
        let a = Recorder::new("a", "telemetry", None);
        let host = PluginHost::new(vec![a.clone()]);
        let out = host
            .apply("system_prompt", &json!({}), Some(json!("memo")), HookKind::SeriesLast)
            .await
            .unwrap();
        assert_eq!(out, Some(json!("memo")));
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }
}

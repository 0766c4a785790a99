// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Typed request/response plus topic pub/sub over a [`Transport`].
//!
//! # Design
//!
//! ```text
//!   caller ──► request() ──► transport ──► peer pump ──► handler task
//!                                                            │
//!   caller ◄── oneshot ◄──── transport ◄── response ◄────────┘
//!
//!   emitter ──► emit_event() ──► transport ──► peer pump ──► broadcast ──► subscribers
//! ```
//!
//! One pump task per bus reads frames off the transport.  Requests are
//! dispatched to their handler on a fresh task so a slow handler never
//! blocks unrelated traffic; responses complete the pending oneshot matched
//! by envelope id; events fan out through a bounded per-topic broadcast
//! channel in FIFO order (a lagging subscriber loses its oldest events
//! rather than stalling the emitter).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::envelope::{Envelope, EnvelopeKind};
use crate::transport::Transport;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("transport closed")]
    TransportClosed,
    #[error("no handler registered for {0}")]
    NoHandler(String),
    /// The remote handler returned an error payload.
    #[error("remote error: {0}")]
    Remote(Value),
}

type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, Value>> + Send + Sync>;
type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Result<Value, BusError>>>>>;
type Topics = Arc<Mutex<HashMap<String, broadcast::Sender<Value>>>>;

const TOPIC_BUFFER: usize = 256;

pub struct MessageBus {
    transport: Arc<dyn Transport>,
    handlers: Arc<RwLock<HashMap<String, Handler>>>,
    pending: Pending,
    topics: Topics,
    closed: Arc<AtomicBool>,
}

impl MessageBus {
    /// Build a bus over `transport` and start its pump task.
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        let bus = Arc::new(Self {
            transport,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            pending: Arc::new(Mutex::new(HashMap::new())),
            topics: Arc::new(Mutex::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
        });
        tokio::spawn(Self::pump(
            Arc::clone(&bus.transport),
            Arc::clone(&bus.handlers),
            Arc::clone(&bus.pending),
            Arc::clone(&bus.topics),
            Arc::clone(&bus.closed),
        ));
        bus
    }

    /// Register the handler for `method`, replacing any previous one.
    pub fn on<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, Value>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |payload| Box::pin(handler(payload)));
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(method.into(), handler);
    }

    /// Issue a request to the peer and await the correlated response.
    /// Timeouts are the caller's responsibility.
    pub async fn request(&self, method: &str, payload: Value) -> Result<Value, BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::TransportClosed);
        }
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), tx);

        let sent = self
            .transport
            .send(Envelope::request(id.clone(), method, payload))
            .await;
        if !sent {
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
            return Err(BusError::TransportClosed);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(BusError::TransportClosed),
        }
    }

    /// Fire-and-forget event to the peer.  Per-topic order is preserved.
    pub async fn emit_event(&self, topic: &str, payload: Value) {
        let _ = self.transport.send(Envelope::event(topic, payload)).await;
    }

    /// Subscribe to events the peer emits on `topic`.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Value> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_BUFFER).0)
            .subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn pump(
        transport: Arc<dyn Transport>,
        handlers: Arc<RwLock<HashMap<String, Handler>>>,
        pending: Pending,
        topics: Topics,
        closed: Arc<AtomicBool>,
    ) {
        while let Some(envelope) = transport.recv().await {
            match envelope.kind {
                EnvelopeKind::Request => {
                    let id = envelope.id.unwrap_or_default();
                    let method = envelope.method.unwrap_or_default();
                    let handler = handlers
                        .read()
                        .unwrap_or_else(|e| e.into_inner())
                        .get(&method)
                        .cloned();
                    let transport = Arc::clone(&transport);
                    match handler {
                        Some(handler) => {
                            // Concurrent dispatch: a slow handler must not
                            // block unrelated requests.
                            tokio::spawn(async move {
                                let reply = match handler(envelope.payload).await {
                                    Ok(data) => Envelope::response(id, data),
                                    Err(error) => Envelope::response_error(id, error),
                                };
                                let _ = transport.send(reply).await;
                            });
                        }
                        None => {
                            warn!(method = %method, "request for unregistered method");
                            let error = serde_json::json!({
                                "message": format!("no handler registered for {method}"),
                            });
                            let _ = transport.send(Envelope::response_error(id, error)).await;
                        }
                    }
                }
                EnvelopeKind::Response => {
                    let Some(id) = envelope.id else {
                        debug!("dropping response without id");
                        continue;
                    };
                    let waiter = pending
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&id);
                    if let Some(waiter) = waiter {
                        let result = match envelope.error {
                            Some(error) => Err(BusError::Remote(error)),
                            None => Ok(envelope.payload),
                        };
                        let _ = waiter.send(result);
                    }
                }
                EnvelopeKind::Event => {
                    let Some(topic) = envelope.topic else { continue };
                    let sender = topics
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .get(&topic)
                        .cloned();
                    if let Some(sender) = sender {
                        // No subscribers is fine; broadcast send only fails
                        // when every receiver is gone.
                        let _ = sender.send(envelope.payload);
                    }
                }
            }
        }

        // Transport gone: fail everything still in flight.
        closed.store(true, Ordering::SeqCst);
        let waiters: Vec<_> = pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        for (_, waiter) in waiters {
            let _ = waiter.send(Err(BusError::TransportClosed));
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DirectTransport;
    use serde_json::json;
    use std::time::Duration;

    fn pair() -> (Arc<MessageBus>, Arc<MessageBus>) {
        let (a, b) = DirectTransport::pair();
        (MessageBus::new(Arc::new(a)), MessageBus::new(Arc::new(b)))
    }

    #[tokio::test]
    async fn request_reaches_handler_and_returns_response() {
        let (frontend, kernel) = pair();
        kernel.on("echo", |payload| async move {
            Ok(json!({"echo": payload}))
        });
        let reply = frontend.request("echo", json!("hi")).await.unwrap();
        assert_eq!(reply["echo"], "hi");
    }

    #[tokio::test]
    async fn handler_error_surfaces_as_remote() {
        let (frontend, kernel) = pair();
        kernel.on("fail", |_| async move { Err(json!({"message": "nope"})) });
        let err = frontend.request("fail", json!(null)).await.unwrap_err();
        match err {
            BusError::Remote(v) => assert_eq!(v["message"], "nope"),
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unregistered_method_returns_remote_error() {
        let (frontend, _kernel) = pair();
        let err = frontend.request("missing", json!(null)).await.unwrap_err();
        assert!(matches!(err, BusError::Remote(_)));
    }

    #[tokio::test]
    async fn slow_handler_does_not_block_unrelated_requests() {
        let (frontend, kernel) = pair();
        kernel.on("slow", |_| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(json!(null))
        });
        kernel.on("fast", |_| async move { Ok(json!("quick")) });

        let frontend2 = Arc::clone(&frontend);
        let slow = tokio::spawn(async move { frontend2.request("slow", json!(null)).await });

        let reply = tokio::time::timeout(
            Duration::from_secs(1),
            frontend.request("fast", json!(null)),
        )
        .await
        .expect("fast request stalled behind slow handler")
        .unwrap();
        assert_eq!(reply, json!("quick"));
        slow.abort();
    }

    #[tokio::test]
    async fn events_fan_out_in_order() {
        let (frontend, kernel) = pair();
        let mut sub = frontend.subscribe("deltas");
        // Give the subscription a moment before the kernel emits.
        for i in 0..5 {
            kernel.emit_event("deltas", json!(i)).await;
        }
        for i in 0..5 {
            let got = tokio::time::timeout(Duration::from_secs(1), sub.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(got, json!(i));
        }
    }

    #[tokio::test]
    async fn events_reach_multiple_subscribers() {
        let (frontend, kernel) = pair();
        let mut one = frontend.subscribe("t");
        let mut two = frontend.subscribe("t");
        kernel.emit_event("t", json!("x")).await;
        assert_eq!(one.recv().await.unwrap(), json!("x"));
        assert_eq!(two.recv().await.unwrap(), json!("x"));
    }

    #[tokio::test]
    async fn pending_requests_fail_when_transport_drops() {
        let (a, b) = DirectTransport::pair();
        let frontend = MessageBus::new(Arc::new(a));
        // The kernel side never constructs a bus; dropping the transport half
        // closes the channel.
        let no_reply = tokio::spawn({
            let frontend = Arc::clone(&frontend);
            async move { frontend.request("anything", json!(null)).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(b);
        let result = tokio::time::timeout(Duration::from_secs(1), no_reply)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(BusError::TransportClosed)));
    }

    #[tokio::test]
    async fn request_after_close_fails_fast() {
        let (a, b) = DirectTransport::pair();
        let frontend = MessageBus::new(Arc::new(a));
        drop(b);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = frontend.request("x", json!(null)).await.unwrap_err();
        assert!(matches!(err, BusError::TransportClosed));
    }

    #[tokio::test]
    async fn concurrent_requests_correlate_by_id() {
        let (frontend, kernel) = pair();
        kernel.on("double", |payload| async move {
            let n = payload.as_i64().unwrap();
            // Stagger completions in reverse order to exercise correlation.
            tokio::time::sleep(Duration::from_millis(100 - (n as u64) * 10)).await;
            Ok(json!(n * 2))
        });
        let mut tasks = Vec::new();
        for n in 0..5 {
            let bus = Arc::clone(&frontend);
            tasks.push(tokio::spawn(
                async move { bus.request("double", json!(n)).await },
            ));
        }
        for (n, task) in tasks.into_iter().enumerate() {
            let reply = task.await.unwrap().unwrap();
            assert_eq!(reply, json!(n as i64 * 2));
        }
    }
}

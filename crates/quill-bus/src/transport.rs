// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::envelope::Envelope;

/// A bidirectional framed channel between two buses.
///
/// Implementations must deliver frames in order and at most once.  `recv`
/// returns `None` when the peer is gone, after which pending requests fail
/// with [`crate::BusError::TransportClosed`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, envelope: Envelope) -> bool;
    async fn recv(&self) -> Option<Envelope>;
}

/// In-process transport: two cross-connected channel halves.  The UI side
/// and kernel side of one process each hold one half.
pub struct DirectTransport {
    tx: mpsc::Sender<Envelope>,
    rx: Mutex<mpsc::Receiver<Envelope>>,
}

impl DirectTransport {
    /// Build a connected pair.  What one half sends, the other receives.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::channel(256);
        let (b_tx, b_rx) = mpsc::channel(256);
        (
            Self {
                tx: a_tx,
                rx: Mutex::new(b_rx),
            },
            Self {
                tx: b_tx,
                rx: Mutex::new(a_rx),
            },
        )
    }
}

#[async_trait]
impl Transport for DirectTransport {
    async fn send(&self, envelope: Envelope) -> bool {
        self.tx.send(envelope).await.is_ok()
    }

    async fn recv(&self) -> Option<Envelope> {
        self.rx.lock().await.recv().await
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn pair_delivers_in_both_directions() {
        let (a, b) = DirectTransport::pair();
        assert!(a.send(Envelope::event("x", json!(1))).await);
        let got = b.recv().await.unwrap();
        assert_eq!(got.topic.as_deref(), Some("x"));

        assert!(b.send(Envelope::event("y", json!(2))).await);
        let got = a.recv().await.unwrap();
        assert_eq!(got.topic.as_deref(), Some("y"));
    }

    #[tokio::test]
    async fn recv_returns_none_after_peer_drop() {
        let (a, b) = DirectTransport::pair();
        drop(a);
        assert!(b.recv().await.is_none());
    }

    #[tokio::test]
    async fn frames_arrive_in_send_order() {
        let (a, b) = DirectTransport::pair();
        for i in 0..10 {
            a.send(Envelope::event("t", json!(i))).await;
        }
        for i in 0..10 {
            let got = b.recv().await.unwrap();
            assert_eq!(got.payload, json!(i));
        }
    }
}

//! Shared write half of a streaming WebSocket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::Bytes;
use futures::SinkExt;
use futures::stream::SplitSink;
use tokio::sync::Mutex;

use crate::errors::SinkError;
use crate::stream::FrameSink;

/// Upper bound on the Close handshake write to a peer that stopped reading.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Serializes frame, ping and close writes onto one socket.
pub struct WsSink {
    inner: Mutex<SplitSink<WebSocket, Message>>,
    closed: AtomicBool,
}

impl WsSink {
    /// Wrap the write half of a split socket.
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self {
            inner: Mutex::new(inner),
            closed: AtomicBool::new(false),
        }
    }

    /// Whether a write has failed or the sink was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send a Close frame and shut the sink. Errors are ignored; the peer
    /// may already be gone.
    pub async fn close(&self, code: u16, reason: &'static str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
            let mut inner = self.inner.lock().await;
            let _ = inner.send(Message::Close(Some(frame))).await;
            let _ = inner.close().await;
        })
        .await;
    }

    async fn write(&self, message: Message) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        let mut inner = self.inner.lock().await;
        inner.send(message).await.map_err(|e| {
            self.closed.store(true, Ordering::Release);
            SinkError::Transport(e.to_string())
        })
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&self, payload: String) -> Result<(), SinkError> {
        self.write(Message::Text(payload.into())).await
    }

    async fn send_ping(&self) -> Result<(), SinkError> {
        self.write(Message::Ping(Bytes::new())).await
    }
}

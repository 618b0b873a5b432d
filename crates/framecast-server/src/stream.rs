//! Per-connection frame stream loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use framecast_core::codec::FrameEncoder;
use framecast_core::errors::EncodeError;
use metrics::{counter, histogram};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::SinkError;
use crate::metrics::{FRAME_ENCODE_SECONDS, FRAMES_SENT_TOTAL};
use crate::session::Session;

/// Write half of a consumer connection.
///
/// Shared by the stream loop and the keepalive monitor; implementations
/// serialize writes internally.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Send one frame payload as a text message.
    async fn send_text(&self, payload: String) -> Result<(), SinkError>;

    /// Send a protocol-level Ping.
    async fn send_ping(&self) -> Result<(), SinkError>;
}

/// Why a stream loop ended.
#[derive(Debug)]
pub enum StreamExit {
    /// A write to the connection failed.
    Disconnected(SinkError),
    /// The session was evicted.
    Expired,
    /// The frame could not be encoded.
    EncodingFailed(EncodeError),
    /// The producer panicked on the blocking worker.
    RenderPanicked(String),
    /// The connection token fired (peer closed, pong timeout or shutdown).
    Cancelled,
}

impl StreamExit {
    /// Label used in logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Disconnected(_) => "disconnected",
            Self::Expired => "expired",
            Self::EncodingFailed(_) => "encoding_failed",
            Self::RenderPanicked(_) => "render_panicked",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Pushes rendered frames of one session to one sink.
pub struct StreamLoop {
    session: Arc<Session>,
    encoder: Arc<dyn FrameEncoder>,
    sink: Arc<dyn FrameSink>,
    frame_interval: Duration,
}

impl StreamLoop {
    /// Loop over `session` writing to `sink` every `frame_interval`.
    pub fn new(
        session: Arc<Session>,
        encoder: Arc<dyn FrameEncoder>,
        sink: Arc<dyn FrameSink>,
        frame_interval: Duration,
    ) -> Self {
        Self {
            session,
            encoder,
            sink,
            frame_interval,
        }
    }

    /// Run until the session expires, a write or encode fails, or `cancel`
    /// fires. Failed writes are never retried.
    pub async fn run(self, cancel: CancellationToken) -> StreamExit {
        let mut pacing = time::interval(self.frame_interval);
        pacing.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sent: u64 = 0;

        let exit = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break StreamExit::Cancelled,
                _ = pacing.tick() => {}
            }

            if self.session.is_expired() {
                break StreamExit::Expired;
            }

            let payload = match self.render().await {
                Ok(payload) => payload,
                Err(exit) => break exit,
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => break StreamExit::Cancelled,
                result = self.sink.send_text(payload) => {
                    if let Err(e) = result {
                        break StreamExit::Disconnected(e);
                    }
                }
            }
            sent += 1;
            counter!(FRAMES_SENT_TOTAL).increment(1);
        };

        match &exit {
            StreamExit::EncodingFailed(e) => {
                warn!(session = %self.session.key(), error = %e, kind = e.error_kind(), "frame encoding failed");
            }
            StreamExit::RenderPanicked(msg) => {
                warn!(session = %self.session.key(), panic = %msg, "frame producer panicked");
            }
            StreamExit::Disconnected(e) => {
                debug!(session = %self.session.key(), error = %e, sent, "connection write failed");
            }
            StreamExit::Expired | StreamExit::Cancelled => {
                debug!(session = %self.session.key(), exit = exit.reason(), sent, "stream stopped");
            }
        }
        exit
    }

    /// Generate and encode one frame on a blocking worker.
    async fn render(&self) -> Result<String, StreamExit> {
        let session = self.session.clone();
        let encoder = self.encoder.clone();
        let started = std::time::Instant::now();
        let rendered = tokio::task::spawn_blocking(move || session.render(encoder.as_ref())).await;
        histogram!(FRAME_ENCODE_SECONDS).record(started.elapsed().as_secs_f64());

        match rendered {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(e)) => Err(StreamExit::EncodingFailed(e)),
            Err(e) => Err(StreamExit::RenderPanicked(e.to_string())),
        }
    }
}

//! One streaming connection from upgrade to close.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, close_code};
use framecast_core::codec::FrameEncoder;
use framecast_settings::FramecastSettings;
use futures::StreamExt;
use metrics::{counter, gauge, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::sink::WsSink;
use crate::keepalive::{Keepalive, PongTracker};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::monitor::LivenessMonitor;
use crate::registry::Attachment;
use crate::stream::{FrameSink, StreamExit, StreamLoop};

/// Settings and handles shared by every connection.
pub struct StreamContext {
    /// Encodes frames into message payloads.
    pub encoder: Arc<dyn FrameEncoder>,
    /// Delay between frames.
    pub frame_interval: Duration,
    /// Delay between keepalive pings.
    pub keepalive_interval: Duration,
    /// Close the connection after this long without a Pong.
    pub pong_timeout: Duration,
    /// Server shutdown token; each connection runs under a child of it.
    pub shutdown: CancellationToken,
}

impl StreamContext {
    /// Context from loaded settings.
    pub fn from_settings(
        settings: &FramecastSettings,
        encoder: Arc<dyn FrameEncoder>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            encoder,
            frame_interval: settings.stream.frame_interval(),
            keepalive_interval: settings.stream.keepalive_interval(),
            pong_timeout: settings.stream.pong_timeout(),
            shutdown,
        }
    }
}

/// Stream frames to `socket` until the session or the connection ends.
///
/// 1. Splits the socket; the write half is shared by the stream loop and the
///    keepalive monitor
/// 2. Drains inbound messages to track Pongs and detect Close
/// 3. Runs the stream loop
/// 4. Stops the keepalive monitor and reader, then sends a Close frame when
///    the server ended the stream
///
/// Dropping `attachment` at the end releases the session.
#[instrument(skip_all, fields(session = %attachment.key()))]
pub async fn serve_connection(
    socket: WebSocket,
    attachment: Attachment,
    ctx: Arc<StreamContext>,
) -> StreamExit {
    let started = std::time::Instant::now();
    let connection = ctx.shutdown.child_token();
    let (tx, mut rx) = socket.split();
    let sink = Arc::new(WsSink::new(tx));
    let pongs = Arc::new(PongTracker::new());

    info!("stream connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let keepalive = LivenessMonitor::spawn(
        "keepalive",
        ctx.keepalive_interval,
        Keepalive::new(
            sink.clone() as Arc<dyn FrameSink>,
            pongs.clone(),
            ctx.pong_timeout,
            connection.clone(),
        ),
        connection.clone(),
    );

    let reader_token = connection.clone();
    let reader_pongs = pongs.clone();
    let reader = tokio::spawn(async move {
        while let Some(msg) = rx.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!("peer sent close frame");
                    break;
                }
                Ok(_) => reader_pongs.mark_alive(),
                Err(e) => {
                    debug!(error = %e, "read failed");
                    break;
                }
            }
        }
        reader_token.cancel();
    });

    let exit = StreamLoop::new(
        attachment.session().clone(),
        ctx.encoder.clone(),
        sink.clone() as Arc<dyn FrameSink>,
        ctx.frame_interval,
    )
    .run(connection.clone())
    .await;

    connection.cancel();
    let _ = keepalive.stop().await;
    reader.abort();

    match &exit {
        StreamExit::Expired => sink.close(close_code::AWAY, "session expired").await,
        StreamExit::Cancelled if ctx.shutdown.is_cancelled() => {
            sink.close(close_code::AWAY, "server shutting down").await;
        }
        StreamExit::EncodingFailed(_) | StreamExit::RenderPanicked(_) => {
            sink.close(close_code::ERROR, "frame encoding failed").await;
        }
        StreamExit::Cancelled | StreamExit::Disconnected(_) => {}
    }

    info!(exit = exit.reason(), "stream disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => exit.reason()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    drop(attachment);
    exit
}

//! Keepalive monitor: pings a streaming connection and drops it when the
//! peer stops answering.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use parking_lot::Mutex;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::KEEPALIVE_PINGS_TOTAL;
use crate::monitor::{MonitorAction, Tick};
use crate::stream::FrameSink;

/// Last time the peer proved it was alive.
#[derive(Debug)]
pub struct PongTracker {
    last_pong: Mutex<Instant>,
}

impl PongTracker {
    /// Tracker starting at the current instant.
    pub fn new() -> Self {
        Self {
            last_pong: Mutex::new(Instant::now()),
        }
    }

    /// Record a Pong (or any other inbound traffic).
    pub fn mark_alive(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last Pong.
    pub fn elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }
}

impl Default for PongTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends one Ping per tick on the connection's shared sink.
pub struct Keepalive {
    sink: Arc<dyn FrameSink>,
    pongs: Arc<PongTracker>,
    pong_timeout: Duration,
    connection: CancellationToken,
}

impl Keepalive {
    /// Keepalive for one connection. `connection` is cancelled on pong timeout.
    pub fn new(
        sink: Arc<dyn FrameSink>,
        pongs: Arc<PongTracker>,
        pong_timeout: Duration,
        connection: CancellationToken,
    ) -> Self {
        Self {
            sink,
            pongs,
            pong_timeout,
            connection,
        }
    }
}

#[async_trait]
impl MonitorAction for Keepalive {
    async fn on_tick(&mut self) -> Tick {
        let silent = self.pongs.elapsed();
        if silent > self.pong_timeout {
            warn!(silent_secs = silent.as_secs(), "peer unresponsive, closing connection");
            self.connection.cancel();
            return Tick::Stop;
        }
        // A peer that stops reading stalls the frame writer, and the ping
        // waits behind it on the same sink.
        match time::timeout(self.pong_timeout, self.sink.send_ping()).await {
            Ok(Ok(())) => {
                counter!(KEEPALIVE_PINGS_TOTAL).increment(1);
                Tick::Continue
            }
            Ok(Err(e)) => {
                debug!(error = %e, "keepalive ping failed");
                Tick::Stop
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.pong_timeout.as_secs(),
                    "ping write stalled, closing connection"
                );
                self.connection.cancel();
                Tick::Stop
            }
        }
    }
}

//! Timer-driven liveness monitors.
//!
//! A [`LivenessMonitor`] runs a [`MonitorAction`] once per `interval` until
//! the action asks to stop or its [`CancellationToken`] fires. Both exits
//! drop the underlying `tokio::time::Interval`. A stopped monitor is never
//! restarted; spawn a new one instead.

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// What the monitor does after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Keep running.
    Continue,
    /// Stop the monitor.
    Stop,
}

/// How a monitor ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// The cancellation token fired.
    Cancelled,
    /// The action returned [`Tick::Stop`].
    Stopped,
}

/// Work performed on every monitor tick.
#[async_trait]
pub trait MonitorAction: Send + 'static {
    /// Run one check.
    async fn on_tick(&mut self) -> Tick;
}

/// Spawns monitor tasks.
pub struct LivenessMonitor;

impl LivenessMonitor {
    /// Spawn `action` on a timer.
    ///
    /// The first tick fires one `interval` after spawning. Cancellation is
    /// observed both while waiting for a tick and while the action runs.
    pub fn spawn<A: MonitorAction>(
        kind: &'static str,
        interval: Duration,
        mut action: A,
        cancel: CancellationToken,
    ) -> MonitorHandle {
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let exit = loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break MonitorExit::Cancelled,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    biased;
                    () = token.cancelled() => break MonitorExit::Cancelled,
                    tick = action.on_tick() => {
                        if tick == Tick::Stop {
                            break MonitorExit::Stopped;
                        }
                    }
                }
            };
            trace!(kind, ?exit, "monitor finished");
            exit
        });
        MonitorHandle { cancel, join }
    }
}

/// Handle to a running monitor.
pub struct MonitorHandle {
    cancel: CancellationToken,
    join: JoinHandle<MonitorExit>,
}

impl MonitorHandle {
    /// Signal the monitor to stop without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the monitor task is still running.
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Cancel and wait for the monitor to finish.
    pub async fn stop(self) -> MonitorExit {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the monitor to finish on its own.
    pub async fn join(self) -> MonitorExit {
        self.join.await.unwrap_or(MonitorExit::Cancelled)
    }
}

//! A single streaming session: its key, frame producer and liveness state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use framecast_core::codec::FrameEncoder;
use framecast_core::errors::EncodeError;
use framecast_core::frame::FrameProducer;
use framecast_core::keys::SessionKey;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::monitor::MonitorHandle;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered and usable.
    Active,
    /// Evicted. Terminal.
    Expired,
}

/// One issued session key and everything that lives as long as it does.
///
/// The registry owns sessions; connections hold an `Arc` while streaming.
/// Once expired, a session never becomes active again.
pub struct Session {
    key: SessionKey,
    producer: Mutex<Box<dyn FrameProducer>>,
    created_at: Instant,
    last_accessed_at: Mutex<Instant>,
    expired: AtomicBool,
    streaming: AtomicBool,
    idle_monitor: Mutex<Option<MonitorHandle>>,
}

impl Session {
    /// New active session.
    pub fn new(key: SessionKey, producer: Box<dyn FrameProducer>) -> Self {
        let now = Instant::now();
        Self {
            key,
            producer: Mutex::new(producer),
            created_at: now,
            last_accessed_at: Mutex::new(now),
            expired: AtomicBool::new(false),
            streaming: AtomicBool::new(false),
            idle_monitor: Mutex::new(None),
        }
    }

    /// Session key.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Creation time.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Last time a client looked the session up or finished streaming.
    pub fn last_accessed_at(&self) -> Instant {
        *self.last_accessed_at.lock()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        if self.is_expired() {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }

    /// Whether the session has been evicted.
    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    /// Whether a connection is currently streaming this session.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Record an access.
    pub fn touch(&self) {
        *self.last_accessed_at.lock() = Instant::now();
    }

    /// Idle means not streaming and unused for strictly longer than `timeout`.
    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        !self.is_streaming() && now.saturating_duration_since(self.last_accessed_at()) > timeout
    }

    /// Mark the session expired and cancel its idle monitor.
    ///
    /// Returns `false` if it was already expired.
    pub fn expire(&self) -> bool {
        if self.expired.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(monitor) = self.idle_monitor.lock().take() {
            monitor.cancel();
        }
        true
    }

    /// Attach the idle monitor. Cancelled at once if the session already expired.
    pub fn set_idle_monitor(&self, monitor: MonitorHandle) {
        let mut slot = self.idle_monitor.lock();
        if self.is_expired() {
            monitor.cancel();
            return;
        }
        if let Some(previous) = slot.replace(monitor) {
            previous.cancel();
        }
    }

    /// Whether an idle monitor is attached and running.
    pub fn has_idle_monitor(&self) -> bool {
        self.idle_monitor
            .lock()
            .as_ref()
            .is_some_and(MonitorHandle::is_running)
    }

    /// Mark a connection as streaming. Fails if one already is or the
    /// session expired.
    pub(crate) fn try_attach(&self) -> bool {
        if self.is_expired() {
            return false;
        }
        self.streaming
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clear the streaming flag and restart the idle clock.
    pub(crate) fn detach(&self) {
        self.touch();
        self.streaming.store(false, Ordering::Release);
    }

    /// Produce the next frame and encode it.
    ///
    /// The producer lock is held only while generating the frame.
    pub fn render(&self, encoder: &dyn FrameEncoder) -> Result<String, EncodeError> {
        let frame = self.producer.lock().next_frame();
        encoder.encode(&frame)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("streaming", &self.is_streaming())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use framecast_core::codec::{BmpCodec, DataUriEncoder};
    use framecast_core::frame::{Frame, Rgba};
    use framecast_core::keys::generate_key;
    use proptest::prelude::*;
    use tokio::time;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::monitor::{LivenessMonitor, MonitorAction, Tick};

    struct Solid;

    impl FrameProducer for Solid {
        fn next_frame(&mut self) -> Frame {
            Frame::filled(2, 2, Rgba::RED)
        }
    }

    struct Noop;

    #[async_trait::async_trait]
    impl MonitorAction for Noop {
        async fn on_tick(&mut self) -> Tick {
            Tick::Continue
        }
    }

    fn session() -> Session {
        Session::new(generate_key().unwrap(), Box::new(Solid))
    }

    proptest! {
        #[test]
        fn idle_iff_strictly_past_timeout(elapsed_ms in 0u64..10_000, timeout_ms in 1u64..10_000) {
            let s = session();
            let now = s.last_accessed_at() + Duration::from_millis(elapsed_ms);
            let timeout = Duration::from_millis(timeout_ms);
            prop_assert_eq!(s.is_idle(now, timeout), elapsed_ms > timeout_ms);

            prop_assert!(s.try_attach());
            prop_assert!(!s.is_idle(now, timeout));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_only_after_threshold() {
        let s = session();
        let timeout = Duration::from_secs(300);

        time::advance(timeout).await;
        assert!(!s.is_idle(Instant::now(), timeout));

        time::advance(Duration::from_secs(1)).await;
        assert!(s.is_idle(Instant::now(), timeout));

        s.touch();
        assert!(!s.is_idle(Instant::now(), timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn streaming_session_is_never_idle() {
        let s = session();
        assert!(s.try_attach());
        time::advance(Duration::from_secs(3600)).await;
        assert!(!s.is_idle(Instant::now(), Duration::from_secs(300)));
    }

    #[test]
    fn attach_is_exclusive() {
        let s = session();
        assert!(s.try_attach());
        assert!(!s.try_attach());
        s.detach();
        assert!(s.try_attach());
    }

    #[test]
    fn expired_session_cannot_attach() {
        let s = session();
        assert!(s.expire());
        assert!(!s.expire());
        assert_eq!(s.state(), SessionState::Expired);
        assert!(!s.try_attach());
    }

    #[tokio::test]
    async fn expire_cancels_idle_monitor() {
        let s = session();
        let monitor = LivenessMonitor::spawn(
            "idle",
            Duration::from_secs(30),
            Noop,
            CancellationToken::new(),
        );
        s.set_idle_monitor(monitor);
        assert!(s.has_idle_monitor());

        assert!(s.expire());
        assert!(!s.has_idle_monitor());
    }

    #[tokio::test]
    async fn monitor_set_after_expiry_is_cancelled() {
        let s = session();
        let _ = s.expire();
        let token = CancellationToken::new();
        let monitor =
            LivenessMonitor::spawn("idle", Duration::from_secs(30), Noop, token.clone());
        s.set_idle_monitor(monitor);
        assert!(token.is_cancelled());
        assert!(!s.has_idle_monitor());
    }

    #[test]
    fn render_produces_data_uri() {
        let s = session();
        let payload = s.render(&DataUriEncoder::new(BmpCodec)).unwrap();
        assert!(payload.starts_with("data:image/bmp;base64,"));
    }
}

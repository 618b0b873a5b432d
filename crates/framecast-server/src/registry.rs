//! Session registry: issues keys, owns sessions, evicts them.
//!
//! Every lookup and mutation goes through one `RwLock`. Eviction removes the
//! entry and marks the session expired under the write lock, so a key found
//! in the map always refers to an active session.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::time::Duration;

use framecast_core::constants::{IDLE_CHECK_INTERVAL, IDLE_TIMEOUT};
use framecast_core::frame::FrameProducer;
use framecast_core::keys::{SessionKey, generate_key};
use framecast_settings::FramecastSettings;
use metrics::{counter, gauge};
use parking_lot::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::SessionError;
use crate::idle::IdleTimeout;
use crate::metrics::{SESSIONS_ACTIVE, SESSIONS_CREATED_TOTAL, SESSIONS_EVICTED_TOTAL};
use crate::monitor::LivenessMonitor;
use crate::session::Session;

/// Builds the frame producer for each new session.
pub type ProducerFactory = Arc<dyn Fn() -> Box<dyn FrameProducer> + Send + Sync>;

/// Registry tunables.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Evict sessions unused for strictly longer than this.
    pub idle_timeout: Duration,
    /// Period of each session's idle monitor.
    pub idle_check_interval: Duration,
    /// Maximum number of live sessions.
    pub max_sessions: usize,
    /// Evict a session as soon as its stream ends.
    pub single_use: bool,
}

impl RegistryConfig {
    /// Registry config from loaded settings.
    pub fn from_settings(settings: &FramecastSettings) -> Self {
        Self {
            idle_timeout: settings.session.idle_timeout(),
            idle_check_interval: settings.session.idle_check_interval(),
            max_sessions: settings.server.max_sessions,
            single_use: settings.session.single_use,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_timeout: IDLE_TIMEOUT,
            idle_check_interval: IDLE_CHECK_INTERVAL,
            max_sessions: 1024,
            single_use: false,
        }
    }
}

/// Why a session left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// Removed by a direct [`SessionRegistry::evict`] call.
    Explicit,
    /// Unused past the idle timeout.
    Idle,
    /// Its only stream ended and reconnects are disabled.
    SingleUse,
    /// The registry shut down.
    Shutdown,
}

impl EvictReason {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Idle => "idle",
            Self::SingleUse => "single_use",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Process-wide session store.
pub struct SessionRegistry {
    entries: RwLock<HashMap<SessionKey, Arc<Session>>>,
    config: RegistryConfig,
    producers: ProducerFactory,
    shutdown: CancellationToken,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new(config: RegistryConfig, producers: ProducerFactory) -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            config,
            producers,
            shutdown: CancellationToken::new(),
        })
    }

    /// Issue a new key, register its session and arm its idle monitor.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn create(self: &Arc<Self>) -> Result<SessionKey, SessionError> {
        let key = generate_key()?;
        let session = Arc::new(Session::new(key.clone(), (self.producers)()));

        let active = {
            let mut entries = self.entries.write();
            if entries.len() >= self.config.max_sessions {
                return Err(SessionError::CapacityExceeded(self.config.max_sessions));
            }
            let _ = entries.insert(key.clone(), session.clone());
            entries.len()
        };

        let monitor = LivenessMonitor::spawn(
            "idle_timeout",
            self.config.idle_check_interval,
            IdleTimeout::new(Arc::downgrade(self), key.clone()),
            self.shutdown.child_token(),
        );
        session.set_idle_monitor(monitor);

        counter!(SESSIONS_CREATED_TOTAL).increment(1);
        gauge!(SESSIONS_ACTIVE).set(active as f64);
        debug!(session = %key, active, "session created");
        Ok(key)
    }

    /// Look up an active session.
    ///
    /// A session idle past the timeout is evicted here and reported as
    /// not found, regardless of when its monitor last ran.
    pub fn get(&self, key: &SessionKey) -> Result<Arc<Session>, SessionError> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Err(SessionError::NotFound(key.clone())),
                Some(session) if !session.is_idle(now, self.config.idle_timeout) => {
                    return Ok(session.clone());
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write();
        self.take_if_idle(&mut entries, key, now)?;
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(key.clone()))
    }

    /// Look up a session and attach a connection to it exclusively.
    ///
    /// Fails with [`SessionError::Busy`] while another connection holds it.
    pub fn claim(self: &Arc<Self>, key: &SessionKey) -> Result<Attachment, SessionError> {
        let mut entries = self.entries.write();
        self.take_if_idle(&mut entries, key, Instant::now())?;
        let session = entries
            .get(key)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(key.clone()))?;
        if !session.try_attach() {
            return Err(SessionError::Busy(key.clone()));
        }
        drop(entries);

        session.touch();
        debug!(session = %key, "session claimed");
        Ok(Attachment {
            session,
            registry: Arc::downgrade(self),
            single_use: self.config.single_use,
        })
    }

    /// Remove a session. Idempotent; returns whether an entry was removed.
    pub fn evict(&self, key: &SessionKey) -> bool {
        self.remove(key, EvictReason::Explicit)
    }

    /// Evict `key` if it is idle.
    ///
    /// `None` when the key is not registered, otherwise whether it was evicted.
    pub fn evict_if_idle(&self, key: &SessionKey) -> Option<bool> {
        let mut entries = self.entries.write();
        let session = entries.get(key)?;
        if !session.is_idle(Instant::now(), self.config.idle_timeout) {
            return Some(false);
        }
        let _ = self.detach_entry(&mut entries, key, EvictReason::Idle);
        Some(true)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of sessions with an attached connection.
    pub fn streaming_count(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|s| s.is_streaming())
            .count()
    }

    /// Evict every session and stop all idle monitors.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let drained: Vec<Arc<Session>> = {
            let mut entries = self.entries.write();
            let drained: Vec<Arc<Session>> = entries.drain().map(|(_, s)| s).collect();
            for session in &drained {
                let _ = session.expire();
            }
            drained
        };
        gauge!(SESSIONS_ACTIVE).set(0.0);
        if !drained.is_empty() {
            counter!(SESSIONS_EVICTED_TOTAL, "reason" => EvictReason::Shutdown.as_str())
                .increment(drained.len() as u64);
        }
        info!(count = drained.len(), "session registry drained");
    }

    fn remove(&self, key: &SessionKey, reason: EvictReason) -> bool {
        let mut entries = self.entries.write();
        self.detach_entry(&mut entries, key, reason)
    }

    /// Evict under an already-held write lock when idle. Errors with
    /// `NotFound` when the session was idle.
    fn take_if_idle(
        &self,
        entries: &mut HashMap<SessionKey, Arc<Session>>,
        key: &SessionKey,
        now: Instant,
    ) -> Result<(), SessionError> {
        let idle = entries
            .get(key)
            .is_some_and(|s| s.is_idle(now, self.config.idle_timeout));
        if idle {
            let _ = self.detach_entry(entries, key, EvictReason::Idle);
            return Err(SessionError::NotFound(key.clone()));
        }
        Ok(())
    }

    fn detach_entry(
        &self,
        entries: &mut HashMap<SessionKey, Arc<Session>>,
        key: &SessionKey,
        reason: EvictReason,
    ) -> bool {
        let Some(session) = entries.remove(key) else {
            return false;
        };
        let _ = session.expire();
        counter!(SESSIONS_EVICTED_TOTAL, "reason" => reason.as_str()).increment(1);
        gauge!(SESSIONS_ACTIVE).set(entries.len() as f64);
        debug!(
            session = %key,
            reason = reason.as_str(),
            age_secs = session.created_at().elapsed().as_secs(),
            "session evicted"
        );
        true
    }
}

/// A connection's exclusive hold on a session.
///
/// Dropping it releases the session: the streaming flag clears and the idle
/// clock restarts, or the session is evicted when reconnects are disabled.
pub struct Attachment {
    session: Arc<Session>,
    registry: Weak<SessionRegistry>,
    single_use: bool,
}

impl Attachment {
    /// Shared handle to the attached session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Deref for Attachment {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        // Evict before clearing the streaming flag so a concurrent claim
        // sees Busy or NotFound, never a reusable single-use session.
        if self.single_use {
            if let Some(registry) = self.registry.upgrade() {
                let _ = registry.remove(self.session.key(), EvictReason::SingleUse);
            }
        }
        self.session.detach();
        debug!(session = %self.session.key(), "session released");
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use assert_matches::assert_matches;
    use framecast_core::frame::{Frame, Rgba};
    use tokio::time;

    use super::*;

    struct Blank;

    impl FrameProducer for Blank {
        fn next_frame(&mut self) -> Frame {
            Frame::filled(1, 1, Rgba::WHITE)
        }
    }

    fn blank_factory() -> ProducerFactory {
        Arc::new(|| Box::new(Blank) as Box<dyn FrameProducer>)
    }

    fn registry() -> Arc<SessionRegistry> {
        SessionRegistry::new(RegistryConfig::default(), blank_factory())
    }

    fn registry_with(config: RegistryConfig) -> Arc<SessionRegistry> {
        SessionRegistry::new(config, blank_factory())
    }

    #[tokio::test]
    async fn create_then_get() {
        let reg = registry();
        let key = reg.create().unwrap();
        assert_eq!(key.as_str().len(), 32);

        let session = reg.get(&key).unwrap();
        assert_eq!(session.key(), &key);
        assert!(session.has_idle_monitor());
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn unknown_key_not_found() {
        let reg = registry();
        let key = SessionKey::parse(&"0".repeat(32)).unwrap();
        assert_matches!(reg.get(&key), Err(SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn keys_are_unique() {
        let reg = registry();
        let keys: HashSet<_> = (0..200).map(|_| reg.create().unwrap()).collect();
        assert_eq!(keys.len(), 200);
    }

    #[tokio::test]
    async fn evict_is_idempotent() {
        let reg = registry();
        let key = reg.create().unwrap();
        let session = reg.get(&key).unwrap();

        assert!(reg.evict(&key));
        assert!(!reg.evict(&key));
        assert!(session.is_expired());
        assert!(!session.has_idle_monitor());
        assert_matches!(reg.get(&key), Err(SessionError::NotFound(_)));
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn get_after_idle_timeout_is_not_found() {
        let reg = registry();
        let key = reg.create().unwrap();

        time::sleep(Duration::from_secs(5 * 60 + 1)).await;
        assert_matches!(reg.get(&key), Err(SessionError::NotFound(_)));
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn session_at_exact_threshold_is_kept() {
        let reg = registry_with(RegistryConfig {
            idle_check_interval: Duration::from_secs(3600),
            ..RegistryConfig::default()
        });
        let key = reg.create().unwrap();

        time::advance(Duration::from_secs(300)).await;
        assert!(reg.get(&key).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_monitor_evicts_on_first_check_past_threshold() {
        let reg = registry();
        let key = reg.create().unwrap();

        // Checks run every 30s; the one at 300s sees exactly the threshold.
        time::sleep(Duration::from_secs(301)).await;
        assert_eq!(reg.len(), 1);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(reg.len(), 0);
        assert_eq!(reg.evict_if_idle(&key), None);
    }

    #[tokio::test(start_paused = true)]
    async fn streaming_session_outlives_idle_timeout() {
        let reg = registry();
        let key = reg.create().unwrap();
        let attachment = reg.claim(&key).unwrap();

        time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.streaming_count(), 1);

        drop(attachment);
        assert_eq!(reg.streaming_count(), 0);
        time::sleep(Duration::from_secs(299)).await;
        assert!(reg.get(&key).is_ok());

        time::sleep(Duration::from_secs(60)).await;
        assert_matches!(reg.get(&key), Err(SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn second_claim_is_busy() {
        let reg = registry();
        let key = reg.create().unwrap();

        let first = reg.claim(&key).unwrap();
        assert!(first.is_streaming());
        assert_matches!(reg.claim(&key), Err(SessionError::Busy(_)));

        drop(first);
        let again = reg.claim(&key).unwrap();
        assert_eq!(again.key(), &key);
    }

    #[tokio::test]
    async fn single_use_evicts_on_release() {
        let reg = registry_with(RegistryConfig {
            single_use: true,
            ..RegistryConfig::default()
        });
        let key = reg.create().unwrap();

        let attachment = reg.claim(&key).unwrap();
        let session = attachment.session().clone();
        drop(attachment);

        assert!(session.is_expired());
        assert_matches!(reg.claim(&key), Err(SessionError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn single_use_release_never_hands_session_to_a_racing_claim() {
        let reg = registry_with(RegistryConfig {
            single_use: true,
            ..RegistryConfig::default()
        });
        for _ in 0..200 {
            let key = reg.create().unwrap();
            let held = reg.claim(&key).unwrap();
            let racer = {
                let reg = reg.clone();
                let key = key.clone();
                std::thread::spawn(move || {
                    loop {
                        match reg.claim(&key) {
                            Err(SessionError::Busy(_)) => std::hint::spin_loop(),
                            other => return other.map(|a| a.key().clone()),
                        }
                    }
                })
            };
            drop(held);
            assert_matches!(racer.join().unwrap(), Err(SessionError::NotFound(_)));
        }
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let reg = registry_with(RegistryConfig {
            max_sessions: 2,
            ..RegistryConfig::default()
        });
        let first = reg.create().unwrap();
        let _ = reg.create().unwrap();
        assert_matches!(reg.create(), Err(SessionError::CapacityExceeded(2)));

        assert!(reg.evict(&first));
        assert!(reg.create().is_ok());
    }

    #[tokio::test]
    async fn shutdown_expires_everything() {
        let reg = registry();
        let keys: Vec<_> = (0..5).map(|_| reg.create().unwrap()).collect();
        let sessions: Vec<_> = keys.iter().map(|k| reg.get(k).unwrap()).collect();

        reg.shutdown();
        assert!(reg.is_empty());
        assert!(sessions.iter().all(|s| s.is_expired()));
        assert!(sessions.iter().all(|s| !s.has_idle_monitor()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_are_all_registered() {
        let reg = registry();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move {
                (0..100).map(|_| reg.create().unwrap()).collect::<Vec<_>>()
            }));
        }

        let mut all = HashSet::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        assert_eq!(all.len(), 800);
        assert_eq!(reg.len(), 800);
        for key in &all {
            assert!(reg.get(key).is_ok());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_registry_stops_monitors() {
        let reg = registry();
        let key = reg.create().unwrap();
        let session = reg.get(&key).unwrap();
        drop(reg);

        time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert!(!session.has_idle_monitor());
        assert!(!session.is_expired());
    }
}

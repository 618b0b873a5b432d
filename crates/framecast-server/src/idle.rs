//! Per-session idle-timeout monitor.

use std::sync::Weak;

use async_trait::async_trait;
use framecast_core::keys::SessionKey;
use tracing::debug;

use crate::monitor::{MonitorAction, Tick};
use crate::registry::SessionRegistry;

/// Evicts its session once it has been idle past the registry's timeout.
///
/// Holds only a weak reference so a dropped registry stops the monitor.
pub struct IdleTimeout {
    registry: Weak<SessionRegistry>,
    key: SessionKey,
}

impl IdleTimeout {
    /// Monitor for `key`.
    pub fn new(registry: Weak<SessionRegistry>, key: SessionKey) -> Self {
        Self { registry, key }
    }
}

#[async_trait]
impl MonitorAction for IdleTimeout {
    async fn on_tick(&mut self) -> Tick {
        let Some(registry) = self.registry.upgrade() else {
            return Tick::Stop;
        };
        match registry.evict_if_idle(&self.key) {
            Some(true) => {
                debug!(session = %self.key, "idle session evicted");
                Tick::Stop
            }
            Some(false) => Tick::Continue,
            None => Tick::Stop,
        }
    }
}

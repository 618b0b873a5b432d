//! Package-level constants and lifecycle defaults.

use std::time::Duration;

/// Current version (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "framecast";

/// Number of random bytes in a session key.
pub const KEY_BYTES: usize = 16;

/// Length of a hex-encoded session key.
pub const KEY_HEX_LEN: usize = KEY_BYTES * 2;

/// A session unused for longer than this is evicted.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How often the idle-timeout monitor checks its session.
pub const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// How often a streaming connection is pinged.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(3);

/// A connection with no Pong for this long is closed.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between two frames of one stream (~30 fps).
pub const FRAME_INTERVAL: Duration = Duration::from_millis(33);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION must be semver (MAJOR.MINOR.PATCH)");
        for part in parts {
            let _: u32 = part.parse().expect("each semver segment must be a number");
        }
    }

    #[test]
    fn key_length_is_twice_byte_count() {
        assert_eq!(KEY_HEX_LEN, 32);
    }

    #[test]
    fn keepalive_runs_well_inside_idle_check() {
        assert!(KEEPALIVE_INTERVAL < IDLE_CHECK_INTERVAL);
        assert!(IDLE_CHECK_INTERVAL < IDLE_TIMEOUT);
        assert!(KEEPALIVE_INTERVAL < PONG_TIMEOUT);
    }
}

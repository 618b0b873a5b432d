//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Number of live sessions.
    pub active_sessions: usize,
    /// Number of sessions with a connected stream.
    pub active_streams: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, sessions: usize, streams: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        active_sessions: sessions,
        active_streams: streams,
    }
}

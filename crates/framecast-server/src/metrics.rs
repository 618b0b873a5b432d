//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Fails if a recorder is already installed in this process.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Sessions created (counter).
pub const SESSIONS_CREATED_TOTAL: &str = "sessions_created_total";
/// Sessions evicted (counter, labels: reason).
pub const SESSIONS_EVICTED_TOTAL: &str = "sessions_evicted_total";
/// Live sessions in the registry (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Session lookups rejected (counter, labels: kind).
pub const SESSION_REJECTIONS_TOTAL: &str = "session_rejections_total";
/// WebSocket streams opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Streaming WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket streams closed (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Stream lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Frames written to clients (counter).
pub const FRAMES_SENT_TOTAL: &str = "frames_sent_total";
/// Frame render + encode seconds (histogram).
pub const FRAME_ENCODE_SECONDS: &str = "frame_encode_seconds";
/// Keepalive pings sent (counter).
pub const KEEPALIVE_PINGS_TOTAL: &str = "keepalive_pings_total";

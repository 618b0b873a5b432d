//! # framecast-server
//!
//! Session lifecycle and frame streaming over axum HTTP + `WebSocket`.
//!
//! - Session registry: key issue, lookup, exclusive claim, eviction
//! - Liveness monitors: per-session idle timeout, per-connection keepalive
//! - Stream loop: paced render, encode and write of frames
//! - HTTP endpoints: `/new`, `/frame/{key}`, `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod errors;
pub mod health;
pub mod idle;
pub mod keepalive;
pub mod metrics;
pub mod monitor;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod stream;
pub mod websocket;

pub use errors::{SessionError, SinkError};
pub use monitor::{LivenessMonitor, MonitorAction, MonitorExit, MonitorHandle, Tick};
pub use registry::{Attachment, ProducerFactory, RegistryConfig, SessionRegistry};
pub use server::FramecastServer;
pub use session::{Session, SessionState};
pub use shutdown::{ShutdownCoordinator, ShutdownOutcome};
pub use stream::{FrameSink, StreamExit, StreamLoop};

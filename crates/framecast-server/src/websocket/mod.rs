//! WebSocket transport for frame streams.

pub mod connection;
pub mod sink;

pub use connection::{StreamContext, serve_connection};
pub use sink::WsSink;

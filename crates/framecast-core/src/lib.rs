//! # framecast-core
//!
//! Foundation types shared by the framecast crates:
//!
//! - **Session keys**: [`SessionKey`] newtype and the OS-random [`generate_key`]
//! - **Frames**: [`Frame`] pixel buffers and the [`FrameProducer`] trait
//! - **Patterns**: built-in producers ([`QuadrantPattern`], [`CanvasPattern`])
//! - **Codecs**: [`ImageCodec`] / [`FrameEncoder`] with a BMP data-URI encoder
//! - **Errors**: [`KeyError`], [`EncodeError`] via `thiserror`
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod codec;
pub mod constants;
pub mod errors;
pub mod frame;
pub mod keys;
pub mod logging;
pub mod pattern;

pub use codec::{BmpCodec, DataUriEncoder, FrameEncoder, ImageCodec};
pub use errors::{EncodeError, KeyError};
pub use frame::{Frame, FrameProducer, Rgba};
pub use keys::{InvalidKey, SessionKey, generate_key, generate_key_with};
pub use logging::{LogFormat, init_subscriber};
pub use pattern::{CanvasPattern, PatternKind, QuadrantPattern};

//! Error types for key generation and frame encoding.

use thiserror::Error;

/// Session key generation failed.
///
/// The only variant is a failing OS randomness source. Callers must abort
/// the request instead of falling back to a weaker generator.
#[derive(Debug, Clone, Error)]
pub enum KeyError {
    /// The operating system CSPRNG returned an error.
    #[error("randomness source failed: {0}")]
    RandomSource(String),
}

/// A frame could not be serialized into a transport payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// The pixel buffer does not match the declared dimensions.
    #[error("invalid frame: expected {expected} bytes for {width}x{height}, got {actual}")]
    InvalidFrame {
        /// Frame width in pixels.
        width: u32,
        /// Frame height in pixels.
        height: u32,
        /// Required buffer length.
        expected: usize,
        /// Actual buffer length.
        actual: usize,
    },

    /// The frame is too large for the target format.
    #[error("frame dimensions {width}x{height} exceed the codec limit")]
    DimensionsTooLarge {
        /// Frame width in pixels.
        width: u32,
        /// Frame height in pixels.
        height: u32,
    },
}

impl EncodeError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidFrame { .. } => "invalid_frame",
            Self::DimensionsTooLarge { .. } => "dimensions_too_large",
        }
    }
}

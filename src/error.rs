//! Error types for the encoder session.
//!
//! Every failure is returned to the caller. Nothing here is retried: a
//! dropped realtime frame cannot be re-encoded later without breaking timing.

use thiserror::Error;

use crate::video::format::PixelFormat;

/// Failure reported by the codec engine. Opaque to the session, which only
/// wraps and forwards it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("codec engine {operation} failed: {message}")]
pub struct EngineError {
    pub operation: &'static str,
    pub message: String,
}

impl EngineError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Errors from allocating a [`PixelBuffer`](crate::video::buffer::PixelBuffer).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("degenerate image size {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },

    #[error("no planar layout for pixel format {0:?}")]
    UnrecognizedFormat(PixelFormat),

    #[error("alignment {0} is not a power of two")]
    InvalidAlignment(usize),

    #[error("image size {width}x{height} overflows the address space")]
    SizeOverflow { width: u32, height: u32 },

    #[error("out of memory reserving {bytes} bytes")]
    OutOfMemory { bytes: usize },
}

/// Errors from `EncoderSession::configure`. The session keeps its previous
/// configuration whenever one of these is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported codec '{0}', only vp8 is implemented")]
    UnsupportedCodec(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error(
        "no VP8-compatible pixel format (preferred {preferred:?}, proposed {proposed:?}); \
         fallback {fallback:?} is not usable"
    )]
    FormatNegotiationFailed {
        preferred: Option<PixelFormat>,
        proposed: PixelFormat,
        fallback: PixelFormat,
    },

    #[error("image buffer allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("session has been destroyed")]
    SessionDestroyed,
}

/// Errors from `EncoderSession::encode` and `flush`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("encoder session is not configured")]
    NotConfigured,

    #[error("encoder session has been destroyed")]
    Destroyed,

    #[error(
        "frame is {actual_format:?} {actual_width}x{actual_height}, \
         session expects {expected_format:?} {expected_width}x{expected_height}"
    )]
    FrameFormatMismatch {
        expected_format: PixelFormat,
        expected_width: u32,
        expected_height: u32,
        actual_format: PixelFormat,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("frame plane {plane}: {reason}")]
    MalformedFrame { plane: usize, reason: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

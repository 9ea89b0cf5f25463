//! VP8 encoder session core.
//!
//! Host parameters are translated into an [`EncoderConfig`], which an
//! [`EncoderSession`] applies to its image buffer and codec engine. Frames
//! are then staged into the buffer and encoded into [`Packet`]s.

pub mod buffer;
pub mod engine;
pub mod format;
pub mod frame;
pub mod session;
pub mod translate;
#[cfg(feature = "vpx")]
pub mod vp8_encode;

pub use buffer::{BufferLayout, PixelBuffer, BUFFER_ALIGNMENT};
pub use engine::{CodecEngine, Packet};
pub use format::PixelFormat;
pub use frame::VideoFrame;
pub use session::{BufferAllocator, EncoderSession, SessionState, SessionStats};
pub use translate::{translate, EncoderConfig};
#[cfg(feature = "vpx")]
pub use vp8_encode::Vp8Engine;

use crate::error::EngineError;

use super::buffer::PixelBuffer;
use super::format::PixelFormat;
use super::translate::EncoderConfig;

/// One compressed frame produced by the codec engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,
    pub pts: i64,
    /// Equal to `pts`: VP8 never reorders frames.
    pub dts: i64,
    pub is_keyframe: bool,
    /// Position in the session's output, assigned by the session.
    pub sequence: u64,
}

impl Packet {
    /// Engine-side constructor; the session fills in `sequence`.
    pub fn new(data: Vec<u8>, pts: i64, is_keyframe: bool) -> Self {
        Self {
            data,
            pts,
            dts: pts,
            is_keyframe,
            sequence: 0,
        }
    }
}

/// The codec library as seen by an encoder session.
///
/// An engine may buffer input and emit packets for earlier frames later, so
/// `encode` returns zero or more packets. A failed `configure` must leave
/// the engine running with its previous configuration.
pub trait CodecEngine {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Pixel formats the engine accepts as input.
    fn supported_formats(&self) -> &[PixelFormat];

    fn configure(&mut self, config: &EncoderConfig) -> Result<(), EngineError>;

    /// Encode the image staged in `image`. `force_keyframe` is a request the
    /// engine may ignore.
    fn encode(
        &mut self,
        image: &PixelBuffer,
        pts: i64,
        force_keyframe: bool,
    ) -> Result<Vec<Packet>, EngineError>;

    /// Drain packets still held inside the engine.
    fn flush(&mut self) -> Result<Vec<Packet>, EngineError>;

    /// Codec private data for muxers. Empty when the codec has none.
    fn private_data(&self) -> Vec<u8>;
}

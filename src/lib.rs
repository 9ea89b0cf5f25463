//! VP8 video encoder session for OBS-style hosts.

pub mod error;
pub mod recording;
pub mod settings;
pub mod video;

/// Encoder registration identity as seen by the host.
pub const ENCODER_ID: &str = "obs_vpx";
pub const ENCODER_CODEC: &str = "vpx";
pub const ENCODER_NAME: &str = "vpx";

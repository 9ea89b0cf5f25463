//! Encoder session: configuration, image buffer lifecycle and the
//! frame-in/packet-out loop.
//!
//! State machine:
//!
//! ```text
//! Uninitialized --configure--> Configured --configure--> Configured
//!        |                          |
//!        +--------destroy-----------+--> Destroyed
//! ```
//!
//! `configure` is atomic. Any error leaves the previous configuration, buffer
//! and engine setup in place, and the session keeps encoding with them.

use serde::Serialize;

use crate::error::{AllocationError, ConfigError, EncodeError};
use crate::settings::HostParams;

use super::buffer::{BufferLayout, PixelBuffer, BUFFER_ALIGNMENT};
use super::engine::{CodecEngine, Packet};
use super::format::PixelFormat;
use super::frame::VideoFrame;
use super::translate::{translate, video_format_for, EncoderConfig};

macro_rules! session_log {
    ($level:ident, $session:expr, $($arg:tt)+) => {
        log::$level!("[vpx encoder: '{}'] {}", $session.name, format_args!($($arg)+))
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Configured,
    Destroyed,
}

/// Counters kept over the session's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames_submitted: u64,
    pub packets_emitted: u64,
    pub keyframes: u64,
    pub bytes_emitted: u64,
    pub buffer_allocations: u64,
    pub buffer_releases: u64,
    pub engine_releases: u64,
    /// Successful configure calls after the first one.
    pub reconfigurations: u64,
}

/// Turns a validated layout into image storage.
pub type BufferAllocator = Box<dyn FnMut(BufferLayout) -> Result<PixelBuffer, AllocationError>>;

pub struct EncoderSession {
    name: String,
    state: SessionState,
    config: Option<EncoderConfig>,
    buffer: Option<PixelBuffer>,
    engine: Option<Box<dyn CodecEngine>>,
    /// Captured on the first successful configure, then fixed.
    extradata: Option<Vec<u8>>,
    next_sequence: u64,
    stats: SessionStats,
    allocate: BufferAllocator,
}

impl std::fmt::Debug for EncoderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderSession")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("config", &self.config)
            .field("buffer", &self.buffer)
            .field("engine", &self.engine.as_ref().map(|e| e.name().to_string()))
            .field("stats", &self.stats)
            .finish()
    }
}

impl EncoderSession {
    /// Create an unconfigured session driving `engine`.
    pub fn new(name: impl Into<String>, engine: Box<dyn CodecEngine>) -> Self {
        let session = Self {
            name: name.into(),
            state: SessionState::Uninitialized,
            config: None,
            buffer: None,
            engine: Some(engine),
            extradata: None,
            next_sequence: 0,
            stats: SessionStats::default(),
            allocate: Box::new(PixelBuffer::with_layout),
        };
        session_log!(
            debug,
            session,
            "created with engine {}",
            session.engine.as_ref().map(|e| e.name()).unwrap_or("none")
        );
        session
    }

    /// Replace how image buffers are allocated.
    pub fn with_allocator(
        mut self,
        allocate: impl FnMut(BufferLayout) -> Result<PixelBuffer, AllocationError> + 'static,
    ) -> Self {
        self.allocate = Box::new(allocate);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current configuration, `None` until the first successful configure.
    pub fn config(&self) -> Option<&EncoderConfig> {
        self.config.as_ref()
    }

    pub fn buffer(&self) -> Option<&PixelBuffer> {
        self.buffer.as_ref()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Apply host parameters.
    ///
    /// Reallocates the image buffer only when width, height or pixel format
    /// change. On error the session keeps its last good configuration.
    pub fn configure(&mut self, params: &HostParams) -> Result<(), ConfigError> {
        let result = self.try_configure(params);
        if let Err(e) = &result {
            session_log!(warn, self, "configure failed: {e}");
            match &self.config {
                Some(c) => session_log!(
                    info,
                    self,
                    "keeping previous configuration {}x{} {:?}",
                    c.width,
                    c.height,
                    c.pixel_format
                ),
                None => session_log!(info, self, "session remains unconfigured"),
            }
        }
        result
    }

    fn try_configure(&mut self, params: &HostParams) -> Result<(), ConfigError> {
        if self.state == SessionState::Destroyed {
            return Err(ConfigError::SessionDestroyed);
        }
        let engine = self.engine.as_mut().ok_or(ConfigError::SessionDestroyed)?;

        let config = translate(params, engine.supported_formats())?;

        let needs_buffer = self
            .config
            .as_ref()
            .map_or(true, |current| current.geometry_differs(&config));
        let layout = if needs_buffer {
            Some(BufferLayout::new(
                config.pixel_format,
                config.width,
                config.height,
                BUFFER_ALIGNMENT,
            )?)
        } else {
            None
        };

        engine.configure(&config)?;

        if let Some(layout) = layout {
            // Old buffer goes first: a session never holds two.
            if let Some(mut old) = self.buffer.take() {
                old.release();
                self.stats.buffer_releases += 1;
            }
            match (self.allocate)(layout) {
                Ok(buffer) => {
                    self.buffer = Some(buffer);
                    self.stats.buffer_allocations += 1;
                }
                Err(e) => {
                    self.restore_previous();
                    return Err(e.into());
                }
            }
        }

        if self.config.is_some() {
            self.stats.reconfigurations += 1;
        }

        session_log!(
            info,
            self,
            "configured {}x{} {:?}, timebase {}/{}, {} kbps {:?}, keyint {}{}",
            config.width,
            config.height,
            config.pixel_format,
            config.timebase_num,
            config.timebase_den,
            config.bitrate_kbps,
            config.rate_control,
            config.keyframe_interval,
            if needs_buffer { ", buffer reallocated" } else { "" }
        );

        self.config = Some(config);
        self.state = SessionState::Configured;

        if self.extradata.is_none() {
            if let Some(engine) = &self.engine {
                let data = engine.private_data();
                session_log!(debug, self, "extradata: {} bytes", data.len());
                self.extradata = Some(data);
            }
        }

        Ok(())
    }

    /// Put the last good configuration back after the new buffer could not
    /// be allocated.
    fn restore_previous(&mut self) {
        let Some(previous) = self.config.clone() else {
            return;
        };

        if let Some(engine) = self.engine.as_mut() {
            if let Err(e) = engine.configure(&previous) {
                session_log!(error, self, "could not restore engine configuration: {e}");
            }
        }

        let restored = BufferLayout::new(
            previous.pixel_format,
            previous.width,
            previous.height,
            BUFFER_ALIGNMENT,
        )
        .and_then(|layout| (self.allocate)(layout));
        match restored {
            Ok(buffer) => {
                self.buffer = Some(buffer);
                self.stats.buffer_allocations += 1;
            }
            Err(e) => {
                session_log!(error, self, "could not restore image buffer: {e}");
                self.config = None;
                self.state = SessionState::Uninitialized;
            }
        }
    }

    /// Encode one host frame, returning whatever packets the engine emitted.
    pub fn encode(
        &mut self,
        frame: &VideoFrame,
        force_keyframe: bool,
    ) -> Result<Vec<Packet>, EncodeError> {
        match self.state {
            SessionState::Uninitialized => return Err(EncodeError::NotConfigured),
            SessionState::Destroyed => return Err(EncodeError::Destroyed),
            SessionState::Configured => {}
        }
        let (Some(buffer), Some(engine)) = (self.buffer.as_mut(), self.engine.as_mut()) else {
            return Err(EncodeError::NotConfigured);
        };

        buffer.copy_from(frame)?;
        self.stats.frames_submitted += 1;

        let packets = match engine.encode(buffer, frame.pts, force_keyframe) {
            Ok(packets) => packets,
            Err(e) => {
                session_log!(error, self, "encode of pts {} failed: {e}", frame.pts);
                return Err(e.into());
            }
        };

        if force_keyframe && !packets.iter().any(|p| p.is_keyframe) {
            session_log!(
                debug,
                self,
                "keyframe requested at pts {} but not emitted",
                frame.pts
            );
        }

        Ok(self.stamp(packets))
    }

    /// Drain packets the engine is still holding.
    pub fn flush(&mut self) -> Result<Vec<Packet>, EncodeError> {
        match self.state {
            SessionState::Uninitialized => return Err(EncodeError::NotConfigured),
            SessionState::Destroyed => return Err(EncodeError::Destroyed),
            SessionState::Configured => {}
        }
        let engine = self.engine.as_mut().ok_or(EncodeError::NotConfigured)?;
        let packets = engine.flush()?;
        session_log!(debug, self, "flushed {} packets", packets.len());
        Ok(self.stamp(packets))
    }

    fn stamp(&mut self, mut packets: Vec<Packet>) -> Vec<Packet> {
        for packet in &mut packets {
            packet.sequence = self.next_sequence;
            self.next_sequence += 1;
            self.stats.packets_emitted += 1;
            self.stats.bytes_emitted += packet.data.len() as u64;
            if packet.is_keyframe {
                self.stats.keyframes += 1;
            }
        }
        packets
    }

    /// Codec private data for downstream muxers. Empty before the first
    /// successful configure.
    pub fn private_data(&self) -> &[u8] {
        self.extradata.as_deref().unwrap_or(&[])
    }

    /// VP8 carries no SEI.
    pub fn sei_data(&self) -> Option<&[u8]> {
        None
    }

    /// Format the host should deliver frames in, given what it produces now.
    pub fn video_format_for(&self, proposed: PixelFormat) -> PixelFormat {
        let formats = self
            .engine
            .as_ref()
            .map(|e| e.supported_formats())
            .unwrap_or(&[]);
        video_format_for(proposed, formats)
    }

    /// Release the image buffer and the engine. Later calls do nothing.
    pub fn destroy(&mut self) {
        if self.state == SessionState::Destroyed {
            return;
        }

        if let Some(mut buffer) = self.buffer.take() {
            buffer.release();
            self.stats.buffer_releases += 1;
        }
        if let Some(engine) = self.engine.take() {
            drop(engine);
            self.stats.engine_releases += 1;
        }
        self.config = None;
        self.state = SessionState::Destroyed;

        session_log!(
            info,
            self,
            "destroyed after {} frames, {} packets",
            self.stats.frames_submitted,
            self.stats.packets_emitted
        );
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

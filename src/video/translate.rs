//! Host parameters to codec configuration.
//!
//! The libvpx timebase is the duration of one tick, i.e. the host frame rate
//! turned upside down: 30/1 fps becomes a 1/30 timebase.

use crate::error::ConfigError;
use crate::settings::{HostParams, RateControl};

use super::format::{PixelFormat, FALLBACK_FORMAT};

/// Largest frame dimension VP8 can signal (14-bit field).
pub const VP8_MAX_DIMENSION: u32 = 16383;

/// Speed/quality trade-off accepted by `VP8E_SET_CPUUSED`.
pub const VP8_CPU_USED_RANGE: std::ops::RangeInclusive<i32> = -16..=16;

/// The only codec variant implemented.
pub const SUPPORTED_CODEC: &str = "vp8";

/// Resolved configuration handed to the codec engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    pub timebase_num: u32,
    pub timebase_den: u32,
    pub pixel_format: PixelFormat,
    pub bitrate_kbps: u32,
    pub rate_control: RateControl,
    /// Maximum distance between keyframes in frames, 0 for automatic.
    pub keyframe_interval: u32,
    pub threads: u32,
    pub cpu_used: i32,
}

impl EncoderConfig {
    /// Host frame rate as (numerator, denominator), undoing the inversion.
    pub fn frame_rate(&self) -> (u32, u32) {
        (self.timebase_den, self.timebase_num)
    }

    /// Whether switching to `other` needs a new image buffer.
    pub fn geometry_differs(&self, other: &EncoderConfig) -> bool {
        self.width != other.width
            || self.height != other.height
            || self.pixel_format != other.pixel_format
    }
}

/// Which candidate the format negotiation settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatChoice {
    Preferred(PixelFormat),
    Proposed(PixelFormat),
    /// Nothing usable was offered.
    Fallback(PixelFormat),
}

impl FormatChoice {
    pub fn format(self) -> PixelFormat {
        match self {
            FormatChoice::Preferred(f) | FormatChoice::Proposed(f) | FormatChoice::Fallback(f) => f,
        }
    }
}

fn usable(format: PixelFormat, engine_formats: &[PixelFormat]) -> bool {
    format.is_planar_420() && engine_formats.contains(&format)
}

/// Pick the pixel format: preferred, then proposed, then the fallback.
pub fn negotiate_format(
    preferred: Option<PixelFormat>,
    proposed: PixelFormat,
    engine_formats: &[PixelFormat],
) -> FormatChoice {
    match preferred {
        Some(f) if usable(f, engine_formats) => FormatChoice::Preferred(f),
        _ if usable(proposed, engine_formats) => FormatChoice::Proposed(proposed),
        _ => FormatChoice::Fallback(FALLBACK_FORMAT),
    }
}

/// Format the host should convert its output to before handing frames over.
///
/// Keeps `proposed` when the engine takes it, otherwise names the first
/// planar 4:2:0 format the engine supports.
pub fn video_format_for(proposed: PixelFormat, engine_formats: &[PixelFormat]) -> PixelFormat {
    if usable(proposed, engine_formats) {
        return proposed;
    }
    engine_formats
        .iter()
        .copied()
        .find(|f| f.is_planar_420())
        .unwrap_or(PixelFormat::I420)
}

/// Translate host parameters into an engine configuration.
pub fn translate(
    params: &HostParams,
    engine_formats: &[PixelFormat],
) -> Result<EncoderConfig, ConfigError> {
    if let Some(codec) = &params.codec {
        if !codec.eq_ignore_ascii_case(SUPPORTED_CODEC) {
            return Err(ConfigError::UnsupportedCodec(codec.clone()));
        }
    }

    if params.width == 0 || params.height == 0 {
        return Err(ConfigError::InvalidParameters(format!(
            "frame size {}x{} must be non-zero",
            params.width, params.height
        )));
    }
    if params.width > VP8_MAX_DIMENSION || params.height > VP8_MAX_DIMENSION {
        return Err(ConfigError::InvalidParameters(format!(
            "frame size {}x{} exceeds VP8 limit of {VP8_MAX_DIMENSION}",
            params.width, params.height
        )));
    }
    if params.frame_rate_numerator == 0 || params.frame_rate_denominator == 0 {
        return Err(ConfigError::InvalidParameters(format!(
            "frame rate {}/{} must have non-zero terms",
            params.frame_rate_numerator, params.frame_rate_denominator
        )));
    }
    // libvpx keeps timebase terms as C ints.
    if params.frame_rate_numerator > i32::MAX as u32
        || params.frame_rate_denominator > i32::MAX as u32
    {
        return Err(ConfigError::InvalidParameters(format!(
            "frame rate {}/{} exceeds the timebase range",
            params.frame_rate_numerator, params.frame_rate_denominator
        )));
    }
    if params.bitrate == 0 {
        return Err(ConfigError::InvalidParameters(
            "bitrate must be non-zero".into(),
        ));
    }
    if !VP8_CPU_USED_RANGE.contains(&params.cpu_used) {
        return Err(ConfigError::InvalidParameters(format!(
            "cpu_used {} outside {}..={}",
            params.cpu_used,
            VP8_CPU_USED_RANGE.start(),
            VP8_CPU_USED_RANGE.end()
        )));
    }

    let pixel_format = match negotiate_format(
        params.preferred_pixel_format,
        params.proposed_pixel_format,
        engine_formats,
    ) {
        FormatChoice::Fallback(fallback) => {
            return Err(ConfigError::FormatNegotiationFailed {
                preferred: params.preferred_pixel_format,
                proposed: params.proposed_pixel_format,
                fallback,
            })
        }
        choice => choice.format(),
    };

    Ok(EncoderConfig {
        width: params.width,
        height: params.height,
        timebase_num: params.frame_rate_denominator,
        timebase_den: params.frame_rate_numerator,
        pixel_format,
        bitrate_kbps: params.bitrate,
        rate_control: params.rate_control,
        keyframe_interval: keyframe_interval_frames(
            params.keyint_sec,
            params.frame_rate_numerator,
            params.frame_rate_denominator,
        ),
        threads: params.threads,
        cpu_used: params.cpu_used,
    })
}

/// Seconds to frames, rounded up. Zero stays zero.
fn keyframe_interval_frames(seconds: u32, fps_num: u32, fps_den: u32) -> u32 {
    if seconds == 0 {
        return 0;
    }
    let frames = (seconds as u64 * fps_num as u64).div_ceil(fps_den as u64);
    frames.min(u32::MAX as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const VP8_FORMATS: &[PixelFormat] = &[PixelFormat::I420, PixelFormat::Yv12];

    fn params(width: u32, height: u32, num: u32, den: u32) -> HostParams {
        HostParams {
            width,
            height,
            frame_rate_numerator: num,
            frame_rate_denominator: den,
            ..HostParams::default()
        }
    }

    #[test]
    fn timebase_is_inverted_frame_rate() {
        let config = translate(&params(1280, 720, 30, 1), VP8_FORMATS).unwrap();
        assert_eq!((config.timebase_num, config.timebase_den), (1, 30));
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 720);
    }

    #[test]
    fn inversion_round_trips_for_common_rates() {
        for (num, den) in [(30, 1), (60000, 1001), (24000, 1001), (25, 1), (1, 2), (7, 3)] {
            let config = translate(&params(640, 480, num, den), VP8_FORMATS).unwrap();
            assert_eq!((config.timebase_num, config.timebase_den), (den, num));

            let (back_num, back_den) = config.frame_rate();
            let again = translate(&params(640, 480, back_num, back_den), VP8_FORMATS).unwrap();
            assert_eq!(again.frame_rate(), (num, den));
        }
    }

    #[test]
    fn zero_terms_are_invalid() {
        for p in [
            params(0, 720, 30, 1),
            params(1280, 0, 30, 1),
            params(1280, 720, 0, 1),
            params(1280, 720, 30, 0),
        ] {
            assert!(matches!(
                translate(&p, VP8_FORMATS),
                Err(ConfigError::InvalidParameters(_))
            ));
        }
    }

    #[test]
    fn oversized_frame_is_invalid() {
        assert!(matches!(
            translate(&params(16384, 720, 30, 1), VP8_FORMATS),
            Err(ConfigError::InvalidParameters(_))
        ));
        assert!(translate(&params(16383, 16, 30, 1), VP8_FORMATS).is_ok());
    }

    #[test]
    fn frame_rate_terms_must_fit_timebase() {
        let too_big = i32::MAX as u32 + 1;
        for p in [
            params(640, 480, too_big, 1),
            params(640, 480, 30, too_big),
        ] {
            assert!(matches!(
                translate(&p, VP8_FORMATS),
                Err(ConfigError::InvalidParameters(_))
            ));
        }
        let config = translate(&params(640, 480, i32::MAX as u32, 1), VP8_FORMATS).unwrap();
        assert_eq!(config.timebase_den, i32::MAX as u32);
    }

    #[test]
    fn cpu_used_outside_vp8_range_is_invalid() {
        for cpu_used in [-17, 17, i32::MAX] {
            let p = HostParams {
                cpu_used,
                ..params(640, 480, 30, 1)
            };
            assert!(matches!(
                translate(&p, VP8_FORMATS),
                Err(ConfigError::InvalidParameters(_))
            ));
        }
        for cpu_used in [-16, 0, 16] {
            let p = HostParams {
                cpu_used,
                ..params(640, 480, 30, 1)
            };
            assert_eq!(translate(&p, VP8_FORMATS).unwrap().cpu_used, cpu_used);
        }
    }

    #[test]
    fn only_vp8_is_accepted() {
        let mut p = params(640, 480, 30, 1);
        p.codec = Some("VP8".into());
        assert!(translate(&p, VP8_FORMATS).is_ok());

        p.codec = Some("vp9".into());
        assert_eq!(
            translate(&p, VP8_FORMATS),
            Err(ConfigError::UnsupportedCodec("vp9".into()))
        );
    }

    #[test]
    fn unsupported_codec_wins_over_bad_size() {
        let mut p = params(0, 0, 30, 1);
        p.codec = Some("vp10".into());
        assert!(matches!(
            translate(&p, VP8_FORMATS),
            Err(ConfigError::UnsupportedCodec(_))
        ));
    }

    #[test]
    fn preferred_format_wins() {
        assert_eq!(
            negotiate_format(Some(PixelFormat::Yv12), PixelFormat::I420, VP8_FORMATS),
            FormatChoice::Preferred(PixelFormat::Yv12)
        );
    }

    #[test]
    fn proposed_format_used_when_preferred_unusable() {
        assert_eq!(
            negotiate_format(Some(PixelFormat::Rgba), PixelFormat::I420, VP8_FORMATS),
            FormatChoice::Proposed(PixelFormat::I420)
        );
        assert_eq!(
            negotiate_format(None, PixelFormat::Yv12, VP8_FORMATS),
            FormatChoice::Proposed(PixelFormat::Yv12)
        );
    }

    #[test]
    fn engine_capabilities_limit_choice() {
        assert_eq!(
            negotiate_format(Some(PixelFormat::Yv12), PixelFormat::I420, &[PixelFormat::I420]),
            FormatChoice::Proposed(PixelFormat::I420)
        );
    }

    #[test]
    fn fallback_is_surfaced_as_failure() {
        let mut p = params(640, 480, 30, 1);
        p.preferred_pixel_format = Some(PixelFormat::Bgra);
        p.proposed_pixel_format = PixelFormat::Nv12;
        assert_eq!(
            translate(&p, VP8_FORMATS),
            Err(ConfigError::FormatNegotiationFailed {
                preferred: Some(PixelFormat::Bgra),
                proposed: PixelFormat::Nv12,
                fallback: PixelFormat::Nv12,
            })
        );
    }

    #[test]
    fn keyframe_interval_in_frames() {
        let mut p = params(640, 480, 30000, 1001);
        p.keyint_sec = 2;
        assert_eq!(translate(&p, VP8_FORMATS).unwrap().keyframe_interval, 60);
        p.keyint_sec = 0;
        assert_eq!(translate(&p, VP8_FORMATS).unwrap().keyframe_interval, 0);
    }

    #[test]
    fn video_format_for_converts_unusable_output() {
        assert_eq!(
            video_format_for(PixelFormat::Nv12, VP8_FORMATS),
            PixelFormat::I420
        );
        assert_eq!(
            video_format_for(PixelFormat::Yv12, VP8_FORMATS),
            PixelFormat::Yv12
        );
    }
}

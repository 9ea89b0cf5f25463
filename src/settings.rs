//! Host-supplied encoder parameters.
//!
//! The host passes its settings as a JSON object. Missing keys take the
//! encoder defaults, so an empty object is a valid 1280x720@30 VP8 setup.

use serde::{Deserialize, Serialize};

use crate::video::format::PixelFormat;

/// Rate control mode forwarded to the codec engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RateControl {
    Cbr,
    Vbr,
}

/// Video parameters and encoder settings from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostParams {
    pub width: u32,
    pub height: u32,
    pub frame_rate_numerator: u32,
    pub frame_rate_denominator: u32,
    /// Format the user asked for, if any.
    pub preferred_pixel_format: Option<PixelFormat>,
    /// Format the host video output currently produces.
    pub proposed_pixel_format: PixelFormat,
    /// Codec selection. Absent means vp8.
    pub codec: Option<String>,
    /// Target bitrate in kbit/s.
    pub bitrate: u32,
    pub rate_control: RateControl,
    /// Seconds between keyframes, 0 lets the engine decide.
    pub keyint_sec: u32,
    /// Encoder threads, 0 for the engine default.
    pub threads: u32,
    /// libvpx speed/quality trade-off, higher is faster.
    pub cpu_used: i32,
}

impl Default for HostParams {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate_numerator: 30,
            frame_rate_denominator: 1,
            preferred_pixel_format: None,
            proposed_pixel_format: PixelFormat::I420,
            codec: None,
            bitrate: 2500,
            rate_control: RateControl::Cbr,
            keyint_sec: 2,
            threads: 0,
            cpu_used: 8,
        }
    }
}

impl HostParams {
    /// Parse the host's JSON settings object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The defaults as a JSON object, for hosts that persist settings.
    pub fn defaults_json() -> serde_json::Value {
        // Serializing plain data into a Value cannot fail.
        serde_json::to_value(Self::default()).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let params = HostParams::from_json("{}").unwrap();
        assert_eq!(params, HostParams::default());
    }

    #[test]
    fn camel_case_keys() {
        let params = HostParams::from_json(
            r#"{
                "width": 640,
                "height": 360,
                "frameRateNumerator": 60000,
                "frameRateDenominator": 1001,
                "preferredPixelFormat": "YV12",
                "codec": "vp8",
                "rateControl": "VBR"
            }"#,
        )
        .unwrap();
        assert_eq!(params.width, 640);
        assert_eq!(params.frame_rate_numerator, 60000);
        assert_eq!(params.frame_rate_denominator, 1001);
        assert_eq!(params.preferred_pixel_format, Some(PixelFormat::Yv12));
        assert_eq!(params.rate_control, RateControl::Vbr);
        assert_eq!(params.bitrate, 2500);
    }

    #[test]
    fn defaults_json_round_trips() {
        let value = HostParams::defaults_json();
        assert_eq!(value["bitrate"], 2500);
        assert_eq!(value["keyintSec"], 2);
        let back: HostParams = serde_json::from_value(value).unwrap();
        assert_eq!(back, HostParams::default());
    }

    #[test]
    fn rejects_negative_width() {
        assert!(HostParams::from_json(r#"{"width": -1}"#).is_err());
    }
}

pub mod ivf;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use crate::video::session::SessionStats;
use crate::video::translate::EncoderConfig;

/// Create a recording directory: ~/obs-vpx/recordings/YYYY-MM-DD_HH-MM-SS/
/// Returns the directory path.
pub fn create_session_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Cannot determine home directory")?;
    create_session_dir_in(&home.join("obs-vpx").join("recordings"))
}

/// Create a timestamped recording directory under `root`.
pub fn create_session_dir_in(root: &Path) -> Result<PathBuf, String> {
    let timestamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let dir = root.join(&timestamp);

    fs::create_dir_all(&dir).map_err(|e| format!("Failed to create session directory: {e}"))?;

    log::info!("Session directory created: {}", dir.display());
    Ok(dir)
}

/// The filename for the encoded stream within the session directory.
pub fn recording_filename() -> &'static str {
    "output.ivf"
}

#[derive(Serialize)]
pub struct SessionMetadata {
    pub encoder_id: String,
    pub encoder_codec: String,
    pub encoder_name: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_seconds: f64,
    pub stream: StreamInfo,
    pub stats: SessionStats,
}

#[derive(Serialize)]
pub struct StreamInfo {
    pub file: String,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub timebase: String,
    pub pixel_format: String,
    pub bitrate_kbps: u32,
    pub private_data_bytes: usize,
}

impl StreamInfo {
    pub fn new(file: &str, config: &EncoderConfig, private_data_bytes: usize) -> Self {
        Self {
            file: file.to_string(),
            codec: "vp8".to_string(),
            width: config.width,
            height: config.height,
            timebase: format!("{}/{}", config.timebase_num, config.timebase_den),
            pixel_format: format!("{:?}", config.pixel_format),
            bitrate_kbps: config.bitrate_kbps,
            private_data_bytes,
        }
    }
}

/// Write session_metadata.json to the session directory.
pub fn write_metadata(dir: &Path, metadata: &SessionMetadata) -> Result<(), String> {
    let path = dir.join("session_metadata.json");
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| format!("Failed to serialize metadata: {e}"))?;
    fs::write(&path, json).map_err(|e| format!("Failed to write metadata: {e}"))?;
    log::info!("Session metadata written: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::HostParams;
    use crate::video::format::PixelFormat;
    use crate::video::translate::translate;

    #[test]
    fn metadata_is_written_as_json() {
        let root = std::env::temp_dir().join(format!("obs-vpx-test-{}", std::process::id()));
        let dir = create_session_dir_in(&root).unwrap();

        let config = translate(&HostParams::default(), &[PixelFormat::I420]).unwrap();
        let metadata = SessionMetadata {
            encoder_id: crate::ENCODER_ID.into(),
            encoder_codec: crate::ENCODER_CODEC.into(),
            encoder_name: "test".into(),
            start_time: "2026-01-01T00:00:00Z".into(),
            end_time: "2026-01-01T00:00:01Z".into(),
            duration_seconds: 1.0,
            stream: StreamInfo::new(recording_filename(), &config, 0),
            stats: SessionStats {
                frames_submitted: 30,
                ..SessionStats::default()
            },
        };
        write_metadata(&dir, &metadata).unwrap();

        let text = fs::read_to_string(dir.join("session_metadata.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["encoder_id"], "obs_vpx");
        assert_eq!(value["encoder_codec"], "vpx");
        assert_eq!(value["stream"]["timebase"], "1/30");
        assert_eq!(value["stream"]["pixel_format"], "I420");
        assert_eq!(value["stats"]["frames_submitted"], 30);

        fs::remove_dir_all(&root).ok();
    }
}

use std::fs::File;
use std::io::BufWriter;

use chrono::Utc;

use obs_vpx::recording::ivf::IvfWriter;
use obs_vpx::recording::{self, SessionMetadata, StreamInfo};
use obs_vpx::settings::HostParams;
use obs_vpx::video::frame::{rgb_to_i420, test_pattern_rgb};
use obs_vpx::video::{EncoderSession, Vp8Engine};

/// Seconds of test pattern to encode.
const DURATION_SECS: u32 = 5;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("obs-vpx starting");

    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn load_params() -> Result<HostParams, String> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read settings {path}: {e}"))?;
            HostParams::from_json(&json).map_err(|e| format!("Invalid settings {path}: {e}"))
        }
        None => Ok(HostParams::default()),
    }
}

fn run() -> Result<(), String> {
    let params = load_params()?;
    let start_time = Utc::now();

    let mut session = EncoderSession::new(obs_vpx::ENCODER_NAME, Box::new(Vp8Engine::new()));
    session.configure(&params).map_err(|e| e.to_string())?;
    let config = session
        .config()
        .cloned()
        .ok_or("session not configured after configure()")?;

    // The test pattern is generated as I420; ask for that when the host
    // settings named something else.
    if config.pixel_format != obs_vpx::video::PixelFormat::I420 {
        return Err(format!(
            "demo source produces I420, settings negotiated {:?}",
            config.pixel_format
        ));
    }

    let dir = recording::create_session_dir()?;
    let file = File::create(dir.join(recording::recording_filename()))
        .map_err(|e| format!("Failed to create output file: {e}"))?;
    let mut ivf = IvfWriter::new(BufWriter::new(file), &config)?;

    let (fps_num, fps_den) = config.frame_rate();
    let frame_count = (DURATION_SECS as u64 * fps_num as u64 / fps_den as u64) as u32;

    for i in 0..frame_count {
        let rgb = test_pattern_rgb(config.width, config.height, i);
        let frame = rgb_to_i420(&rgb, config.width, config.height, i as i64);
        let packets = session.encode(&frame, false).map_err(|e| e.to_string())?;
        for packet in &packets {
            ivf.write_packet(packet)?;
        }
    }

    for packet in &session.flush().map_err(|e| e.to_string())? {
        ivf.write_packet(packet)?;
    }
    let written = ivf.frame_count();
    ivf.finalize()?;

    let end_time = Utc::now();
    let metadata = SessionMetadata {
        encoder_id: obs_vpx::ENCODER_ID.to_string(),
        encoder_codec: obs_vpx::ENCODER_CODEC.to_string(),
        encoder_name: session.name().to_string(),
        start_time: start_time.to_rfc3339(),
        end_time: end_time.to_rfc3339(),
        duration_seconds: (end_time - start_time).num_milliseconds() as f64 / 1000.0,
        stream: StreamInfo::new(
            recording::recording_filename(),
            &config,
            session.private_data().len(),
        ),
        stats: session.stats().clone(),
    };
    recording::write_metadata(&dir, &metadata)?;

    session.destroy();
    log::info!("Wrote {written} frames to {}", dir.display());
    Ok(())
}

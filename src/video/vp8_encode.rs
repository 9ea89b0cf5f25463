/// VP8 codec engine using raw `env-libvpx-sys` FFI.
use std::ffi::CStr;
use std::mem::MaybeUninit;
use std::os::raw::{c_int, c_ulong};
use std::ptr;
use std::slice;

use vpx_sys as vpx;

use crate::error::EngineError;
use crate::settings::RateControl;

use super::buffer::PixelBuffer;
use super::engine::{CodecEngine, Packet};
use super::format::PixelFormat;
use super::translate::EncoderConfig;

const VP8_FORMATS: &[PixelFormat] = &[PixelFormat::I420, PixelFormat::Yv12];

pub struct Vp8Engine {
    /// Boxed so the context keeps one address for its whole life.
    ctx: Option<Box<vpx::vpx_codec_ctx_t>>,
    config: Option<EncoderConfig>,
    extradata: Vec<u8>,
}

// SAFETY: The encoder context is only used from a single thread at a time.
// vpx_codec_ctx_t contains internal pointers that are not inherently Send,
// but exclusive access through &mut self guarantees safety.
unsafe impl Send for Vp8Engine {}

fn check(err: vpx::vpx_codec_err_t, operation: &'static str) -> Result<(), EngineError> {
    if err == vpx::VPX_CODEC_OK {
        return Ok(());
    }
    let text = unsafe { CStr::from_ptr(vpx::vpx_codec_err_to_string(err)) }
        .to_string_lossy()
        .into_owned();
    Err(EngineError::new(operation, format!("{text} ({err:?})")))
}

fn image_format(format: PixelFormat) -> Option<vpx::vpx_img_fmt_t> {
    match format {
        PixelFormat::I420 => Some(vpx::vpx_img_fmt::VPX_IMG_FMT_I420),
        PixelFormat::Yv12 => Some(vpx::vpx_img_fmt::VPX_IMG_FMT_YV12),
        _ => None,
    }
}

fn encoder_config(config: &EncoderConfig) -> Result<vpx::vpx_codec_enc_cfg_t, EngineError> {
    unsafe {
        let iface = vpx::vpx_codec_vp8_cx();
        if iface.is_null() {
            return Err(EngineError::new("configure", "vpx_codec_vp8_cx returned null"));
        }

        let mut cfg: vpx::vpx_codec_enc_cfg_t = MaybeUninit::zeroed().assume_init();
        check(
            vpx::vpx_codec_enc_config_default(iface, &mut cfg, 0),
            "config_default",
        )?;

        cfg.g_w = config.width;
        cfg.g_h = config.height;
        cfg.g_timebase.num = config.timebase_num as c_int;
        cfg.g_timebase.den = config.timebase_den as c_int;
        cfg.rc_target_bitrate = config.bitrate_kbps;
        cfg.rc_end_usage = match config.rate_control {
            RateControl::Cbr => vpx::vpx_rc_mode::VPX_CBR,
            RateControl::Vbr => vpx::vpx_rc_mode::VPX_VBR,
        };
        cfg.g_threads = config.threads;
        // Realtime: every frame must come back out immediately.
        cfg.g_lag_in_frames = 0;
        if config.keyframe_interval > 0 {
            cfg.kf_min_dist = 0;
            cfg.kf_max_dist = config.keyframe_interval;
        }

        Ok(cfg)
    }
}

fn init_context(cfg: &vpx::vpx_codec_enc_cfg_t) -> Result<Box<vpx::vpx_codec_ctx_t>, EngineError> {
    unsafe {
        let iface = vpx::vpx_codec_vp8_cx();
        let mut ctx: Box<vpx::vpx_codec_ctx_t> = Box::new(MaybeUninit::zeroed().assume_init());
        check(
            vpx::vpx_codec_enc_init_ver(
                &mut *ctx,
                iface,
                cfg,
                0,
                vpx::VPX_ENCODER_ABI_VERSION as i32,
            ),
            "init",
        )?;
        Ok(ctx)
    }
}

fn global_headers(ctx: &mut vpx::vpx_codec_ctx_t) -> Vec<u8> {
    unsafe {
        let headers = vpx::vpx_codec_get_global_headers(ctx);
        if headers.is_null() || (*headers).buf.is_null() {
            // VP8 has no global headers.
            return Vec::new();
        }
        slice::from_raw_parts((*headers).buf as *const u8, (*headers).sz as usize).to_vec()
    }
}

fn set_cpu_used(ctx: &mut vpx::vpx_codec_ctx_t, cpu_used: i32) -> Result<(), EngineError> {
    check(
        unsafe {
            vpx::vpx_codec_control_(
                ctx,
                vpx::vp8e_enc_control_id::VP8E_SET_CPUUSED as _,
                cpu_used as c_int,
            )
        },
        "control",
    )
}

fn drain_packets(ctx: &mut vpx::vpx_codec_ctx_t) -> Vec<Packet> {
    let mut packets = Vec::new();
    let mut iter: vpx::vpx_codec_iter_t = ptr::null();
    loop {
        let pkt = unsafe { vpx::vpx_codec_get_cx_data(ctx, &mut iter) };
        if pkt.is_null() {
            break;
        }
        unsafe {
            if (*pkt).kind == vpx::vpx_codec_cx_pkt_kind::VPX_CODEC_CX_FRAME_PKT {
                let f = &(*pkt).data.frame;
                let data = slice::from_raw_parts(f.buf as *const u8, f.sz as usize).to_vec();
                let is_keyframe = (f.flags & vpx::VPX_FRAME_IS_KEY) != 0;
                packets.push(Packet::new(data, f.pts, is_keyframe));
            }
        }
    }
    packets
}

impl Vp8Engine {
    /// An engine with no libvpx context yet; `configure` creates it.
    pub fn new() -> Self {
        Self {
            ctx: None,
            config: None,
            extradata: Vec::new(),
        }
    }
}

impl Default for Vp8Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecEngine for Vp8Engine {
    fn name(&self) -> &str {
        "libvpx-vp8"
    }

    fn supported_formats(&self) -> &[PixelFormat] {
        VP8_FORMATS
    }

    fn configure(&mut self, config: &EncoderConfig) -> Result<(), EngineError> {
        if image_format(config.pixel_format).is_none() {
            return Err(EngineError::new(
                "configure",
                format!("{:?} is not VP8 input", config.pixel_format),
            ));
        }
        let cfg = encoder_config(config)?;

        // libvpx cannot grow a VP8 stream past its initial size, so a new
        // frame size gets a new context. It replaces the old one only once
        // it exists.
        let same_size = self
            .config
            .as_ref()
            .is_some_and(|c| c.width == config.width && c.height == config.height);

        if same_size && self.ctx.is_some() {
            if let Some(ctx) = self.ctx.as_mut() {
                check(
                    unsafe { vpx::vpx_codec_enc_config_set(&mut **ctx, &cfg) },
                    "config_set",
                )?;
                set_cpu_used(ctx, config.cpu_used)?;
            }
        } else {
            let mut ctx = init_context(&cfg)?;
            if let Err(e) = set_cpu_used(&mut ctx, config.cpu_used) {
                unsafe {
                    vpx::vpx_codec_destroy(&mut *ctx);
                }
                return Err(e);
            }
            self.extradata = global_headers(&mut ctx);
            if let Some(mut old) = self.ctx.replace(ctx) {
                unsafe {
                    vpx::vpx_codec_destroy(&mut *old);
                }
            }
        }

        self.config = Some(config.clone());
        Ok(())
    }

    fn encode(
        &mut self,
        image: &PixelBuffer,
        pts: i64,
        force_keyframe: bool,
    ) -> Result<Vec<Packet>, EngineError> {
        let (Some(ctx), Some(config)) = (self.ctx.as_mut(), self.config.as_ref()) else {
            return Err(EngineError::new("encode", "engine is not configured"));
        };
        if image.format() != config.pixel_format
            || image.width() != config.width
            || image.height() != config.height
        {
            return Err(EngineError::new(
                "encode",
                "image does not match the configured size or format",
            ));
        }
        let fmt = image_format(image.format())
            .ok_or_else(|| EngineError::new("encode", "unsupported image format"))?;

        // Buffer planes are in memory order: Y U V for I420, Y V U for YV12.
        let (u, v) = match image.format() {
            PixelFormat::Yv12 => (2, 1),
            _ => (1, 2),
        };

        let flags = if force_keyframe {
            vpx::VPX_EFLAG_FORCE_KF as vpx::vpx_enc_frame_flags_t
        } else {
            0
        };

        unsafe {
            let mut img: vpx::vpx_image_t = MaybeUninit::zeroed().assume_init();
            let wrapped = vpx::vpx_img_wrap(
                &mut img,
                fmt,
                config.width,
                config.height,
                1,
                image.plane(0).as_ptr() as *mut u8,
            );
            if wrapped.is_null() {
                return Err(EngineError::new("encode", "vpx_img_wrap failed"));
            }

            // Point libvpx at the aligned planes instead of the packed layout
            // vpx_img_wrap assumed.
            img.planes[0] = image.plane(0).as_ptr() as *mut u8;
            img.planes[1] = image.plane(u).as_ptr() as *mut u8;
            img.planes[2] = image.plane(v).as_ptr() as *mut u8;
            img.stride[0] = image.stride(0) as c_int;
            img.stride[1] = image.stride(u) as c_int;
            img.stride[2] = image.stride(v) as c_int;

            check(
                vpx::vpx_codec_encode(
                    &mut **ctx,
                    &img,
                    pts,
                    1,
                    flags,
                    vpx::VPX_DL_REALTIME as c_ulong,
                ),
                "encode",
            )?;
        }

        Ok(drain_packets(ctx))
    }

    fn flush(&mut self) -> Result<Vec<Packet>, EngineError> {
        let Some(ctx) = self.ctx.as_mut() else {
            return Ok(Vec::new());
        };
        check(
            unsafe {
                vpx::vpx_codec_encode(
                    &mut **ctx,
                    ptr::null(),
                    -1,
                    1,
                    0,
                    vpx::VPX_DL_REALTIME as c_ulong,
                )
            },
            "flush",
        )?;
        Ok(drain_packets(ctx))
    }

    fn private_data(&self) -> Vec<u8> {
        self.extradata.clone()
    }
}

impl Drop for Vp8Engine {
    fn drop(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            unsafe {
                vpx::vpx_codec_destroy(&mut *ctx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::HostParams;
    use crate::video::buffer::BUFFER_ALIGNMENT;
    use crate::video::frame::VideoFrame;
    use crate::video::translate::translate;

    fn config(width: u32, height: u32) -> EncoderConfig {
        let params = HostParams {
            width,
            height,
            ..HostParams::default()
        };
        translate(&params, VP8_FORMATS).unwrap()
    }

    #[test]
    fn first_frame_is_a_keyframe() {
        let config = config(320, 240);
        let mut engine = Vp8Engine::new();
        engine.configure(&config).unwrap();

        let mut image =
            PixelBuffer::allocate(PixelFormat::I420, 320, 240, BUFFER_ALIGNMENT).unwrap();
        image
            .copy_from(&VideoFrame::filled(PixelFormat::I420, 320, 240, 128, 0))
            .unwrap();

        let packets = engine.encode(&image, 0, false).unwrap();
        assert_eq!(packets.len(), 1);
        assert!(packets[0].is_keyframe);
        assert!(!packets[0].data.is_empty());
        assert!(engine.private_data().is_empty());
    }

    #[test]
    fn forced_keyframe_is_honoured() {
        let config = config(160, 120);
        let mut engine = Vp8Engine::new();
        engine.configure(&config).unwrap();
        let image = PixelBuffer::allocate(PixelFormat::I420, 160, 120, BUFFER_ALIGNMENT).unwrap();

        engine.encode(&image, 0, false).unwrap();
        let delta = engine.encode(&image, 1, false).unwrap();
        assert!(delta.iter().all(|p| !p.is_keyframe));
        let forced = engine.encode(&image, 2, true).unwrap();
        assert!(forced.iter().any(|p| p.is_keyframe));
    }

    #[test]
    fn resize_recreates_context() {
        let mut engine = Vp8Engine::new();
        engine.configure(&config(160, 120)).unwrap();
        engine.configure(&config(320, 240)).unwrap();
        let image = PixelBuffer::allocate(PixelFormat::I420, 320, 240, BUFFER_ALIGNMENT).unwrap();
        let packets = engine.encode(&image, 0, false).unwrap();
        assert!(packets[0].is_keyframe);
    }

    #[test]
    fn rejected_cpu_used_is_returned() {
        let mut bad = config(160, 120);
        bad.cpu_used = 99;

        let mut fresh = Vp8Engine::new();
        assert!(fresh.configure(&bad).is_err());
        let image = PixelBuffer::allocate(PixelFormat::I420, 160, 120, BUFFER_ALIGNMENT).unwrap();
        assert!(fresh.encode(&image, 0, false).is_err());

        let mut engine = Vp8Engine::new();
        engine.configure(&config(160, 120)).unwrap();
        assert!(engine.configure(&bad).is_err());
    }

    #[test]
    fn rejects_nv12() {
        let mut cfg = config(160, 120);
        cfg.pixel_format = PixelFormat::Nv12;
        assert!(Vp8Engine::new().configure(&cfg).is_err());
    }
}

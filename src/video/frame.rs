use super::format::PixelFormat;

/// A raw frame as delivered by the host: one byte vector per plane, each
/// with its own linesize (bytes between row starts, may include padding).
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<Vec<u8>>,
    pub linesize: Vec<usize>,
    /// Presentation timestamp in host frame units.
    pub pts: i64,
}

impl VideoFrame {
    /// A tightly packed frame with every byte set to `value`.
    pub fn filled(format: PixelFormat, width: u32, height: u32, value: u8, pts: i64) -> Self {
        let mut planes = Vec::with_capacity(format.plane_count());
        let mut linesize = Vec::with_capacity(format.plane_count());
        for p in 0..format.plane_count() {
            if let Some(g) = format.plane_geometry(p, width, height) {
                planes.push(vec![value; (g.row_bytes * g.rows) as usize]);
                linesize.push(g.row_bytes as usize);
            }
        }
        Self {
            format,
            width,
            height,
            planes,
            linesize,
            pts,
        }
    }

    /// Split contiguous I420 data (Y + U + V, no padding) into planes.
    ///
    /// Returns `None` if `data` is not exactly one I420 image.
    pub fn from_i420(data: &[u8], width: u32, height: u32, pts: i64) -> Option<Self> {
        let format = PixelFormat::I420;
        if data.len() as u64 != format.frame_size(width, height) {
            return None;
        }

        let mut planes = Vec::with_capacity(3);
        let mut linesize = Vec::with_capacity(3);
        let mut offset = 0usize;
        for p in 0..3 {
            let g = format.plane_geometry(p, width, height)?;
            let len = (g.row_bytes * g.rows) as usize;
            planes.push(data[offset..offset + len].to_vec());
            linesize.push(g.row_bytes as usize);
            offset += len;
        }

        Some(Self {
            format,
            width,
            height,
            planes,
            linesize,
            pts,
        })
    }
}

/// Convert RGB24 data to an I420 frame using BT.601 coefficients.
///
/// Chroma is the average of each 2x2 block; odd edges reuse the last
/// row/column.
pub fn rgb_to_i420(rgb: &[u8], width: u32, height: u32, pts: i64) -> VideoFrame {
    let w = width as usize;
    let h = height as usize;
    let uv_w = w.div_ceil(2);
    let uv_h = h.div_ceil(2);

    let mut y_plane = vec![0u8; w * h];
    let mut u_plane = vec![0u8; uv_w * uv_h];
    let mut v_plane = vec![0u8; uv_w * uv_h];

    for row in 0..h {
        for col in 0..w {
            let idx = (row * w + col) * 3;
            let r = rgb[idx] as f32;
            let g = rgb[idx + 1] as f32;
            let b = rgb[idx + 2] as f32;
            let y = 16.0 + 65.481 * r / 255.0 + 128.553 * g / 255.0 + 24.966 * b / 255.0;
            y_plane[row * w + col] = y.clamp(0.0, 255.0) as u8;
        }
    }

    for row in 0..uv_h {
        for col in 0..uv_w {
            let mut r_sum = 0u32;
            let mut g_sum = 0u32;
            let mut b_sum = 0u32;
            for dy in 0..2 {
                for dx in 0..2 {
                    let src_row = (row * 2 + dy).min(h - 1);
                    let src_col = (col * 2 + dx).min(w - 1);
                    let idx = (src_row * w + src_col) * 3;
                    r_sum += rgb[idx] as u32;
                    g_sum += rgb[idx + 1] as u32;
                    b_sum += rgb[idx + 2] as u32;
                }
            }
            let r = (r_sum / 4) as f32;
            let g = (g_sum / 4) as f32;
            let b = (b_sum / 4) as f32;

            let u = 128.0 - 37.797 * r / 255.0 - 74.203 * g / 255.0 + 112.0 * b / 255.0;
            let v = 128.0 + 112.0 * r / 255.0 - 93.786 * g / 255.0 - 18.214 * b / 255.0;

            u_plane[row * uv_w + col] = u.clamp(0.0, 255.0) as u8;
            v_plane[row * uv_w + col] = v.clamp(0.0, 255.0) as u8;
        }
    }

    VideoFrame {
        format: PixelFormat::I420,
        width,
        height,
        planes: vec![y_plane, u_plane, v_plane],
        linesize: vec![w, uv_w, uv_w],
        pts,
    }
}

/// Moving colour-bar test pattern in RGB24, used by the demo binary.
pub fn test_pattern_rgb(width: u32, height: u32, frame_index: u32) -> Vec<u8> {
    const BARS: [[u8; 3]; 7] = [
        [235, 235, 235],
        [235, 235, 16],
        [16, 235, 235],
        [16, 235, 16],
        [235, 16, 235],
        [235, 16, 16],
        [16, 16, 235],
    ];

    let w = width as usize;
    let h = height as usize;
    let shift = frame_index as usize * 4;
    let bar_width = (w / BARS.len()).max(1);

    let mut rgb = vec![0u8; w * h * 3];
    for row in 0..h {
        for col in 0..w {
            let bar = ((col + shift) / bar_width) % BARS.len();
            let idx = (row * w + col) * 3;
            rgb[idx..idx + 3].copy_from_slice(&BARS[bar]);
        }
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_i420_splits_planes() {
        let mut data = vec![1u8; 4 * 4];
        data.extend(vec![2u8; 4]);
        data.extend(vec![3u8; 4]);
        let frame = VideoFrame::from_i420(&data, 4, 4, 7).unwrap();
        assert_eq!(frame.planes.len(), 3);
        assert_eq!(frame.linesize, vec![4, 2, 2]);
        assert!(frame.planes[2].iter().all(|&b| b == 3));
        assert_eq!(frame.pts, 7);
    }

    #[test]
    fn from_i420_rejects_wrong_length() {
        assert!(VideoFrame::from_i420(&[0u8; 10], 4, 4, 0).is_none());
    }

    #[test]
    fn rgb_white_maps_to_studio_range() {
        let rgb = vec![255u8; 4 * 2 * 3];
        let frame = rgb_to_i420(&rgb, 4, 2, 0);
        assert!(frame.planes[0].iter().all(|&y| (234..=235).contains(&y)));
        assert!(frame.planes[1].iter().all(|&u| (127..=129).contains(&u)));
        assert!(frame.planes[2].iter().all(|&v| (127..=129).contains(&v)));
    }

    #[test]
    fn rgb_odd_size_does_not_overrun() {
        let rgb = test_pattern_rgb(5, 3, 1);
        let frame = rgb_to_i420(&rgb, 5, 3, 0);
        assert_eq!(frame.planes[0].len(), 15);
        assert_eq!(frame.planes[1].len(), 3 * 2);
    }
}

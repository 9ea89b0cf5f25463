use serde::{Deserialize, Serialize};

/// Pixel formats a host can hand to the encoder.
///
/// Only the planar 4:2:0 formats (`I420`, `Yv12`) are valid VP8 input. `Nv12`
/// is 4:2:0 too, but semi-planar, and is what format negotiation falls back
/// to when nothing usable was offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    I420,
    Yv12,
    Nv12,
    I444,
    Yuy2,
    Rgba,
    Bgra,
    Unknown,
}

/// Bytes per row and number of rows of one plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneGeometry {
    pub row_bytes: u64,
    pub rows: u64,
}

/// Format chosen when negotiation finds nothing the codec accepts.
pub const FALLBACK_FORMAT: PixelFormat = PixelFormat::Nv12;

impl PixelFormat {
    /// Fully planar with half-resolution chroma in both directions.
    pub fn is_planar_420(self) -> bool {
        matches!(self, PixelFormat::I420 | PixelFormat::Yv12)
    }

    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::I420 | PixelFormat::Yv12 | PixelFormat::I444 => 3,
            PixelFormat::Nv12 => 2,
            PixelFormat::Yuy2 | PixelFormat::Rgba | PixelFormat::Bgra => 1,
            PixelFormat::Unknown => 0,
        }
    }

    /// Geometry of `plane` for an image of `width`x`height`, or `None` if the
    /// format has no such plane.
    ///
    /// Odd dimensions round the subsampled chroma planes up, so the last
    /// column/row of luma always has chroma.
    pub fn plane_geometry(self, plane: usize, width: u32, height: u32) -> Option<PlaneGeometry> {
        if plane >= self.plane_count() {
            return None;
        }
        let w = width as u64;
        let h = height as u64;
        let half_w = w.div_ceil(2);
        let half_h = h.div_ceil(2);

        let (row_bytes, rows) = match (self, plane) {
            (PixelFormat::I420 | PixelFormat::Yv12, 0) => (w, h),
            (PixelFormat::I420 | PixelFormat::Yv12, _) => (half_w, half_h),
            (PixelFormat::Nv12, 0) => (w, h),
            // Interleaved UV pairs
            (PixelFormat::Nv12, _) => (half_w * 2, half_h),
            (PixelFormat::I444, _) => (w, h),
            // Y0 U Y1 V macropixels
            (PixelFormat::Yuy2, _) => (half_w * 4, h),
            (PixelFormat::Rgba | PixelFormat::Bgra, _) => (w * 4, h),
            (PixelFormat::Unknown, _) => return None,
        };

        Some(PlaneGeometry { row_bytes, rows })
    }

    /// Tightly packed size of a whole image in bytes.
    pub fn frame_size(self, width: u32, height: u32) -> u64 {
        (0..self.plane_count())
            .filter_map(|p| self.plane_geometry(p, width, height))
            .map(|g| g.row_bytes * g.rows)
            .sum()
    }
}

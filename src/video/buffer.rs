use crate::error::{AllocationError, EncodeError};

use super::format::PixelFormat;
use super::frame::VideoFrame;

/// Row alignment applied to every plane handed to the codec engine.
pub const BUFFER_ALIGNMENT: usize = 32;

/// Placement of one plane inside the buffer storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Offset from the aligned start of the storage.
    pub offset: usize,
    /// Bytes between row starts, a multiple of the alignment.
    pub stride: usize,
    /// Meaningful bytes per row.
    pub row_bytes: usize,
    pub rows: usize,
}

/// Complete plane layout for one format and size. Computing it performs all
/// validation an allocation needs, without touching memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferLayout {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub alignment: usize,
    pub planes: Vec<PlaneLayout>,
    pub total_bytes: usize,
}

impl BufferLayout {
    pub fn new(
        format: PixelFormat,
        width: u32,
        height: u32,
        alignment: usize,
    ) -> Result<Self, AllocationError> {
        if width == 0 || height == 0 {
            return Err(AllocationError::ZeroDimension { width, height });
        }
        if format.plane_count() == 0 {
            return Err(AllocationError::UnrecognizedFormat(format));
        }
        if !alignment.is_power_of_two() {
            return Err(AllocationError::InvalidAlignment(alignment));
        }

        let overflow = AllocationError::SizeOverflow { width, height };
        let mut planes = Vec::with_capacity(format.plane_count());
        let mut offset = 0usize;

        for p in 0..format.plane_count() {
            let geometry = format
                .plane_geometry(p, width, height)
                .ok_or(AllocationError::UnrecognizedFormat(format))?;
            let row_bytes = usize::try_from(geometry.row_bytes).map_err(|_| overflow.clone())?;
            let rows = usize::try_from(geometry.rows).map_err(|_| overflow.clone())?;
            let stride = align_up(row_bytes, alignment).ok_or_else(|| overflow.clone())?;
            let plane_bytes = stride.checked_mul(rows).ok_or_else(|| overflow.clone())?;

            planes.push(PlaneLayout {
                offset,
                stride,
                row_bytes,
                rows,
            });

            // Strides are aligned, so every following plane starts aligned too.
            offset = offset
                .checked_add(plane_bytes)
                .ok_or_else(|| overflow.clone())?;
        }

        Ok(Self {
            format,
            width,
            height,
            alignment,
            planes,
            total_bytes: offset,
        })
    }

    /// Same format and dimensions.
    pub fn same_geometry(&self, format: PixelFormat, width: u32, height: u32) -> bool {
        self.format == format && self.width == width && self.height == height
    }
}

fn align_up(value: usize, alignment: usize) -> Option<usize> {
    Some(value.checked_add(alignment - 1)? & !(alignment - 1))
}

/// An aligned, strided image buffer used to stage host frames for the codec
/// engine.
///
/// Storage is over-allocated by `alignment - 1` bytes and the planes start at
/// the first aligned address inside it. The storage is never resized after
/// allocation, so that address stays valid for the buffer's lifetime.
pub struct PixelBuffer {
    layout: BufferLayout,
    storage: Vec<u8>,
    base: usize,
    allocated: bool,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("format", &self.layout.format)
            .field("width", &self.layout.width)
            .field("height", &self.layout.height)
            .field("bytes", &self.layout.total_bytes)
            .field("allocated", &self.allocated)
            .finish()
    }
}

impl PixelBuffer {
    /// Allocate a zeroed buffer for `format` at `width`x`height`.
    pub fn allocate(
        format: PixelFormat,
        width: u32,
        height: u32,
        alignment: usize,
    ) -> Result<Self, AllocationError> {
        Self::with_layout(BufferLayout::new(format, width, height, alignment)?)
    }

    /// Allocate storage for a layout computed earlier.
    pub fn with_layout(layout: BufferLayout) -> Result<Self, AllocationError> {
        let bytes = layout
            .total_bytes
            .checked_add(layout.alignment - 1)
            .ok_or(AllocationError::SizeOverflow {
                width: layout.width,
                height: layout.height,
            })?;

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(bytes)
            .map_err(|_| AllocationError::OutOfMemory { bytes })?;
        storage.resize(bytes, 0);

        let addr = storage.as_ptr() as usize;
        let base = (layout.alignment - addr % layout.alignment) % layout.alignment;

        Ok(Self {
            layout,
            storage,
            base,
            allocated: true,
        })
    }

    /// Free the storage. Safe to call any number of times.
    pub fn release(&mut self) {
        if !self.allocated {
            return;
        }
        self.storage = Vec::new();
        self.base = 0;
        self.allocated = false;
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    pub fn format(&self) -> PixelFormat {
        self.layout.format
    }

    pub fn width(&self) -> u32 {
        self.layout.width
    }

    pub fn height(&self) -> u32 {
        self.layout.height
    }

    pub fn plane_count(&self) -> usize {
        self.layout.planes.len()
    }

    pub fn stride(&self, plane: usize) -> usize {
        self.layout.planes[plane].stride
    }

    /// Bytes of `plane`, `stride * rows` long. Empty once released.
    pub fn plane(&self, plane: usize) -> &[u8] {
        if !self.allocated {
            return &[];
        }
        let p = &self.layout.planes[plane];
        let start = self.base + p.offset;
        &self.storage[start..start + p.stride * p.rows]
    }

    pub fn plane_mut(&mut self, plane: usize) -> &mut [u8] {
        if !self.allocated {
            return &mut [];
        }
        let p = self.layout.planes[plane];
        let start = self.base + p.offset;
        &mut self.storage[start..start + p.stride * p.rows]
    }

    /// Copy a host frame into the buffer row by row.
    ///
    /// The frame must have exactly this buffer's format and dimensions. Its
    /// linesize may differ from the buffer stride.
    pub fn copy_from(&mut self, frame: &VideoFrame) -> Result<(), EncodeError> {
        if !self.allocated {
            return Err(EncodeError::NotConfigured);
        }
        if !self
            .layout
            .same_geometry(frame.format, frame.width, frame.height)
        {
            return Err(EncodeError::FrameFormatMismatch {
                expected_format: self.layout.format,
                expected_width: self.layout.width,
                expected_height: self.layout.height,
                actual_format: frame.format,
                actual_width: frame.width,
                actual_height: frame.height,
            });
        }

        let plane_count = self.plane_count();
        if frame.planes.len() < plane_count || frame.linesize.len() < plane_count {
            return Err(EncodeError::MalformedFrame {
                plane: frame.planes.len().min(frame.linesize.len()),
                reason: format!("expected {plane_count} planes"),
            });
        }

        // Validate every plane before writing anything.
        for (i, p) in self.layout.planes.iter().enumerate() {
            let linesize = frame.linesize[i];
            if linesize < p.row_bytes {
                return Err(EncodeError::MalformedFrame {
                    plane: i,
                    reason: format!("linesize {linesize} shorter than row of {}", p.row_bytes),
                });
            }
            let Some(needed) = linesize
                .checked_mul(p.rows - 1)
                .and_then(|n| n.checked_add(p.row_bytes))
            else {
                return Err(EncodeError::MalformedFrame {
                    plane: i,
                    reason: format!("linesize {linesize} overflows {} rows", p.rows),
                });
            };
            if frame.planes[i].len() < needed {
                return Err(EncodeError::MalformedFrame {
                    plane: i,
                    reason: format!("{} bytes, need {needed}", frame.planes[i].len()),
                });
            }
        }

        for i in 0..plane_count {
            let p = self.layout.planes[i];
            let linesize = frame.linesize[i];
            let src = &frame.planes[i];
            let dst = self.plane_mut(i);
            for row in 0..p.rows {
                let s = row * linesize;
                let d = row * p.stride;
                dst[d..d + p.row_bytes].copy_from_slice(&src[s..s + p.row_bytes]);
            }
        }

        Ok(())
    }
}

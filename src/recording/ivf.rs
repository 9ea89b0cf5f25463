//! IVF writer for VP8 packets.
//!
//! Layout (little-endian):
//!   header, 32 bytes:
//!     0..4    "DKIF"
//!     4..6    version (0)
//!     6..8    header size (32)
//!     8..12   fourcc "VP80"
//!     12..14  width
//!     14..16  height
//!     16..20  rate  (timebase denominator)
//!     20..24  scale (timebase numerator)
//!     24..28  frame count, patched on finalize
//!     28..32  reserved
//!   per frame: size (u32), pts (u64), payload

use std::io::{Seek, SeekFrom, Write};

use crate::video::engine::Packet;
use crate::video::translate::EncoderConfig;

pub const IVF_HEADER_SIZE: usize = 32;
pub const IVF_FRAME_HEADER_SIZE: usize = 12;
const FRAME_COUNT_OFFSET: u64 = 24;

pub struct IvfWriter<W: Write + Seek> {
    writer: W,
    frame_count: u32,
}

impl<W: Write + Seek> IvfWriter<W> {
    /// Create a writer and write the file header for `config`.
    pub fn new(mut writer: W, config: &EncoderConfig) -> Result<Self, String> {
        let width = u16::try_from(config.width)
            .map_err(|_| format!("width {} does not fit IVF header", config.width))?;
        let height = u16::try_from(config.height)
            .map_err(|_| format!("height {} does not fit IVF header", config.height))?;

        let mut header = [0u8; IVF_HEADER_SIZE];
        header[0..4].copy_from_slice(b"DKIF");
        header[4..6].copy_from_slice(&0u16.to_le_bytes());
        header[6..8].copy_from_slice(&(IVF_HEADER_SIZE as u16).to_le_bytes());
        header[8..12].copy_from_slice(b"VP80");
        header[12..14].copy_from_slice(&width.to_le_bytes());
        header[14..16].copy_from_slice(&height.to_le_bytes());
        header[16..20].copy_from_slice(&config.timebase_den.to_le_bytes());
        header[20..24].copy_from_slice(&config.timebase_num.to_le_bytes());

        writer
            .write_all(&header)
            .map_err(|e| format!("IVF header write failed: {e}"))?;

        Ok(Self {
            writer,
            frame_count: 0,
        })
    }

    /// Append one packet as an IVF frame.
    pub fn write_packet(&mut self, packet: &Packet) -> Result<(), String> {
        let size = u32::try_from(packet.data.len())
            .map_err(|_| format!("packet of {} bytes too large for IVF", packet.data.len()))?;

        let mut frame_header = [0u8; IVF_FRAME_HEADER_SIZE];
        frame_header[0..4].copy_from_slice(&size.to_le_bytes());
        frame_header[4..12].copy_from_slice(&(packet.pts as u64).to_le_bytes());

        self.writer
            .write_all(&frame_header)
            .and_then(|_| self.writer.write_all(&packet.data))
            .map_err(|e| format!("IVF frame write failed: {e}"))?;
        self.frame_count += 1;
        Ok(())
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Patch the frame count into the header and hand back the writer.
    pub fn finalize(mut self) -> Result<W, String> {
        let end = self
            .writer
            .stream_position()
            .map_err(|e| format!("IVF seek failed: {e}"))?;
        self.writer
            .seek(SeekFrom::Start(FRAME_COUNT_OFFSET))
            .and_then(|_| self.writer.write_all(&self.frame_count.to_le_bytes()))
            .and_then(|_| self.writer.seek(SeekFrom::Start(end)))
            .and_then(|_| self.writer.flush())
            .map_err(|e| format!("IVF finalize failed: {e}"))?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::settings::HostParams;
    use crate::video::format::PixelFormat;
    use crate::video::translate::translate;

    fn config() -> EncoderConfig {
        let params = HostParams {
            width: 640,
            height: 360,
            frame_rate_numerator: 30000,
            frame_rate_denominator: 1001,
            ..HostParams::default()
        };
        translate(&params, &[PixelFormat::I420]).unwrap()
    }

    #[test]
    fn header_layout() {
        let writer = IvfWriter::new(Cursor::new(Vec::new()), &config()).unwrap();
        let bytes = writer.finalize().unwrap().into_inner();
        assert_eq!(bytes.len(), IVF_HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"DKIF");
        assert_eq!(&bytes[8..12], b"VP80");
        assert_eq!(u16::from_le_bytes([bytes[12], bytes[13]]), 640);
        assert_eq!(u16::from_le_bytes([bytes[14], bytes[15]]), 360);
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 30000);
        assert_eq!(u32::from_le_bytes(bytes[20..24].try_into().unwrap()), 1001);
        assert_eq!(u32::from_le_bytes(bytes[24..28].try_into().unwrap()), 0);
    }

    #[test]
    fn frames_follow_header_and_count_is_patched() {
        let mut writer = IvfWriter::new(Cursor::new(Vec::new()), &config()).unwrap();
        writer.write_packet(&Packet::new(vec![1, 2, 3], 0, true)).unwrap();
        writer.write_packet(&Packet::new(vec![4], 1, false)).unwrap();
        assert_eq!(writer.frame_count(), 2);

        let bytes = writer.finalize().unwrap().into_inner();
        assert_eq!(u32::from_le_bytes(bytes[24..28].try_into().unwrap()), 2);

        let first = &bytes[IVF_HEADER_SIZE..];
        assert_eq!(u32::from_le_bytes(first[0..4].try_into().unwrap()), 3);
        assert_eq!(u64::from_le_bytes(first[4..12].try_into().unwrap()), 0);
        assert_eq!(&first[12..15], &[1, 2, 3]);

        let second = &first[15..];
        assert_eq!(u32::from_le_bytes(second[0..4].try_into().unwrap()), 1);
        assert_eq!(u64::from_le_bytes(second[4..12].try_into().unwrap()), 1);
        assert_eq!(second[12], 4);
        assert_eq!(bytes.len(), IVF_HEADER_SIZE + 2 * IVF_FRAME_HEADER_SIZE + 4);
    }
}

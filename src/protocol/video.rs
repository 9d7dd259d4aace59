//! Video extended header
//!
//! 32 bytes, little-endian, at the front of every video payload:
//!
//! ```text
//! [0..4]   codec fourcc (VMX1 or NV12)
//! [4..8]   width (i32)
//! [8..12]  height (i32)
//! [12..16] frame rate numerator (i32)
//! [16..20] frame rate denominator (i32)
//! [20..24] aspect ratio (f32)
//! [24..28] interlace flag (i32)
//! [28..32] color space (i32, 709)
//! ```

use crate::error::ProtocolError;

/// Video extended header size
pub const VIDEO_HEADER_SIZE: usize = 32;

/// Compressed VMX video
pub const FOURCC_VMX1: u32 = 0x3158_4D56;

/// Raw NV12 planes
pub const FOURCC_NV12: u32 = 0x3231_564E;

/// 32-bit float planar audio
pub const FOURCC_FPA1: u32 = 0x3141_5046;

/// Widest frame accepted (8K)
pub const MAX_WIDTH: i32 = 7680;

/// Tallest frame accepted (8K)
pub const MAX_HEIGHT: i32 = 4320;

/// BT.709 color space tag
pub const COLOR_SPACE_BT709: i32 = 709;

/// Render a fourcc for logs, falling back to hex for unprintable codes.
pub fn fourcc_to_string(fourcc: u32) -> String {
    let b = fourcc.to_le_bytes();
    if b.iter().all(|c| c.is_ascii_graphic()) {
        b.iter().map(|&c| c as char).collect()
    } else {
        format!("0x{fourcc:08X}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoHeader {
    pub fourcc: u32,
    pub width: i32,
    pub height: i32,
    pub frame_rate_num: i32,
    pub frame_rate_den: i32,
    pub aspect_ratio: f32,
    pub interlaced: bool,
    pub color_space: i32,
}

impl VideoHeader {
    /// Progressive BT.709 header with a square-pixel aspect ratio.
    pub fn progressive(fourcc: u32, width: i32, height: i32, fps_num: i32, fps_den: i32) -> Self {
        Self {
            fourcc,
            width,
            height,
            frame_rate_num: fps_num,
            frame_rate_den: fps_den,
            aspect_ratio: width as f32 / height as f32,
            interlaced: false,
            color_space: COLOR_SPACE_BT709,
        }
    }

    pub fn write_to(&self, buf: &mut [u8; VIDEO_HEADER_SIZE]) {
        buf[0..4].copy_from_slice(&self.fourcc.to_le_bytes());
        buf[4..8].copy_from_slice(&self.width.to_le_bytes());
        buf[8..12].copy_from_slice(&self.height.to_le_bytes());
        buf[12..16].copy_from_slice(&self.frame_rate_num.to_le_bytes());
        buf[16..20].copy_from_slice(&self.frame_rate_den.to_le_bytes());
        buf[20..24].copy_from_slice(&self.aspect_ratio.to_le_bytes());
        buf[24..28].copy_from_slice(&(self.interlaced as i32).to_le_bytes());
        buf[28..32].copy_from_slice(&self.color_space.to_le_bytes());
    }

    /// Parse and validate a video payload prefix. Returns the header and
    /// the offset where pixel data begins.
    pub fn parse(payload: &[u8]) -> Result<(Self, usize), ProtocolError> {
        if payload.len() < VIDEO_HEADER_SIZE {
            return Err(ProtocolError::HeaderTruncated {
                need: VIDEO_HEADER_SIZE,
                have: payload.len(),
            });
        }

        let read_i32 =
            |off: usize| i32::from_le_bytes(payload[off..off + 4].try_into().unwrap());

        let header = Self {
            fourcc: u32::from_le_bytes(payload[0..4].try_into().unwrap()),
            width: read_i32(4),
            height: read_i32(8),
            frame_rate_num: read_i32(12),
            frame_rate_den: read_i32(16),
            aspect_ratio: f32::from_le_bytes(payload[20..24].try_into().unwrap()),
            interlaced: read_i32(24) != 0,
            color_space: read_i32(28),
        };

        if header.width < 1
            || header.width > MAX_WIDTH
            || header.height < 1
            || header.height > MAX_HEIGHT
        {
            return Err(ProtocolError::BadDimensions {
                width: header.width,
                height: header.height,
            });
        }

        Ok((header, VIDEO_HEADER_SIZE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_values() {
        // The codes spell out their names on a little-endian wire.
        assert_eq!(&FOURCC_VMX1.to_le_bytes(), b"VMX1");
        assert_eq!(&FOURCC_NV12.to_le_bytes(), b"NV12");
        assert_eq!(&FOURCC_FPA1.to_le_bytes(), b"FPA1");
        assert_eq!(fourcc_to_string(FOURCC_VMX1), "VMX1");
        assert_eq!(fourcc_to_string(0x0000_0001), "0x00000001");
    }

    #[test]
    fn test_header_roundtrip() {
        let header = VideoHeader::progressive(FOURCC_VMX1, 1920, 1080, 30, 1);
        let mut buf = [0u8; VIDEO_HEADER_SIZE];
        header.write_to(&mut buf);

        let (parsed, offset) = VideoHeader::parse(&buf).unwrap();
        assert_eq!(offset, VIDEO_HEADER_SIZE);
        assert_eq!(parsed, header);
        assert_eq!(parsed.color_space, COLOR_SPACE_BT709);
        assert!(!parsed.interlaced);
    }

    #[test]
    fn test_dimension_bounds() {
        for (w, h) in [(0, 1080), (1920, 0), (7681, 1080), (1920, 4321), (-1, 2)] {
            let mut header = VideoHeader::progressive(FOURCC_NV12, 1920, 1080, 30, 1);
            header.width = w;
            header.height = h;
            let mut buf = [0u8; VIDEO_HEADER_SIZE];
            header.write_to(&mut buf);
            assert!(
                matches!(
                    VideoHeader::parse(&buf),
                    Err(ProtocolError::BadDimensions { .. })
                ),
                "{w}x{h} should be rejected"
            );
        }

        // 8K is the inclusive limit.
        let header = VideoHeader::progressive(FOURCC_NV12, 7680, 4320, 30, 1);
        let mut buf = [0u8; VIDEO_HEADER_SIZE];
        header.write_to(&mut buf);
        assert!(VideoHeader::parse(&buf).is_ok());
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            VideoHeader::parse(&[0u8; 16]),
            Err(ProtocolError::HeaderTruncated { .. })
        ));
    }
}

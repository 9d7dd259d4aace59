//! Length-prefixed frame codec
//!
//! Every OMT frame starts with a 16-byte little-endian base header:
//!
//! ```text
//! [0]      version: 1
//! [1]      frame type: 1 = metadata, 2 = video, 4 = audio
//! [2..10]  timestamp (u64) — 100 ns ticks, opaque to receivers
//! [10..12] reserved (u16)
//! [12..16] payload_length (u32) — extended header + payload
//! ```
//!
//! The payload begins with a frame-type-specific extended header.

use bytes::Bytes;
use std::io::{Read, Write};

use crate::error::{Error, ProtocolError, Result};

/// Base header size in bytes
pub const FRAME_HEADER_SIZE: usize = 16;

/// Protocol version emitted and accepted
pub const FRAME_VERSION: u8 = 1;

/// Maximum payload for a video frame
pub const MAX_VIDEO_PAYLOAD: u32 = 16 * 1024 * 1024;

/// Maximum payload for a metadata frame
pub const MAX_METADATA_PAYLOAD: u32 = 1024 * 1024;

/// Maximum payload for an audio frame
pub const MAX_AUDIO_PAYLOAD: u32 = 1024 * 1024;

/// Upper bound on bytes skipped while resynchronizing after a bad header
pub const MAX_RESYNC_SKIP: u32 = 65536;

/// Frame type discriminator carried in the base header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Metadata = 1,
    Video = 2,
    Audio = 4,
}

impl FrameType {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            1 => Some(FrameType::Metadata),
            2 => Some(FrameType::Video),
            4 => Some(FrameType::Audio),
            _ => None,
        }
    }

    /// Per-type payload length cap
    pub fn max_payload(self) -> u32 {
        match self {
            FrameType::Metadata => MAX_METADATA_PAYLOAD,
            FrameType::Video => MAX_VIDEO_PAYLOAD,
            FrameType::Audio => MAX_AUDIO_PAYLOAD,
        }
    }
}

/// A complete frame read off the wire
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_type: FrameType,
    pub timestamp: u64,
    pub payload: Bytes,
}

fn read_exact_or_disconnect<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Protocol(ProtocolError::Disconnected)
        } else {
            Error::Io(e)
        }
    })
}

/// Read one frame, resynchronizing past malformed headers.
///
/// A header with a bad version, unknown type, or out-of-range length is not
/// fatal: up to `min(payload_length, 64 KiB)` bytes are skipped and the read
/// restarts. A short read is a disconnection. Read timeouts surface as
/// `Error::Io` so callers can re-enter the loop.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame> {
    loop {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        read_exact_or_disconnect(reader, &mut header)?;

        let version = header[0];
        let raw_type = header[1];
        let timestamp = u64::from_le_bytes(header[2..10].try_into().unwrap());
        let payload_length = u32::from_le_bytes(header[12..16].try_into().unwrap());

        let frame_type = FrameType::from_wire(raw_type);
        let valid = version == FRAME_VERSION
            && frame_type.is_some_and(|t| payload_length <= t.max_payload());

        if !valid {
            let skip = payload_length.min(MAX_RESYNC_SKIP) as usize;
            tracing::warn!(
                version,
                raw_type,
                payload_length,
                skip,
                "malformed frame header, resynchronizing"
            );
            let mut remaining = skip;
            let mut scratch = [0u8; 4096];
            while remaining > 0 {
                let n = remaining.min(scratch.len());
                read_exact_or_disconnect(reader, &mut scratch[..n])?;
                remaining -= n;
            }
            continue;
        }

        let frame_type = frame_type.unwrap();
        let mut payload = vec![0u8; payload_length as usize];
        read_exact_or_disconnect(reader, &mut payload)?;

        return Ok(Frame {
            frame_type,
            timestamp,
            payload: Bytes::from(payload),
        });
    }
}

/// Write one frame: base header, extended header, payload.
///
/// `payload_length` covers both the extended header and the payload. The
/// caller is responsible for flushing the stream.
pub fn write_frame<W: Write>(
    writer: &mut W,
    frame_type: FrameType,
    timestamp: u64,
    extended: &[u8],
    payload: &[u8],
) -> Result<()> {
    write_frame_parts(writer, frame_type, timestamp, extended, &[payload])
}

/// Like [`write_frame`], but the payload is scattered across several
/// slices (an NV12 frame is its Y and UV planes; no point concatenating).
pub fn write_frame_parts<W: Write>(
    writer: &mut W,
    frame_type: FrameType,
    timestamp: u64,
    extended: &[u8],
    parts: &[&[u8]],
) -> Result<()> {
    let total = (extended.len() + parts.iter().map(|p| p.len()).sum::<usize>()) as u32;
    let mut header = [0u8; FRAME_HEADER_SIZE];
    header[0] = FRAME_VERSION;
    header[1] = frame_type as u8;
    header[2..10].copy_from_slice(&timestamp.to_le_bytes());
    header[12..16].copy_from_slice(&total.to_le_bytes());

    writer.write_all(&header)?;
    writer.write_all(extended)?;
    for part in parts {
        writer.write_all(part)?;
    }
    Ok(())
}

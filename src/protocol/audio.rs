//! Audio extended header
//!
//! 24 bytes, little-endian. Two layouts are in the wild:
//!
//! ```text
//! legacy:  fourcc | sample_rate | channels    | bits        | samples/ch | reserved
//! vMix:    fourcc | sample_rate | samples/ch  | channels    | active mask | reserved
//! ```
//!
//! The u32 at offset 8 decides: a value in 1..=8 can only be a channel
//! count, so the header is legacy; anything else is a sample count and the
//! header is vMix. Some legacy senders additionally swapped the bits and
//! samples fields, so within the legacy branch whichever of the two fields
//! looks like a bit depth is taken as one.
//!
//! Writers always emit the vMix layout.

use crate::error::ProtocolError;
use crate::protocol::video::{fourcc_to_string, FOURCC_FPA1};

/// Audio extended header size
pub const AUDIO_HEADER_SIZE: usize = 24;

/// Bitfield marking left + right as the active channels
pub const ACTIVE_CHANNELS_STEREO: u32 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioHeader {
    pub fourcc: u32,
    pub sample_rate: u32,
    pub channels: u32,
    pub bits_per_sample: u32,
    pub samples_per_channel: u32,
    /// Active-channel bitfield; zero when the header came in legacy layout.
    pub active_channels: u32,
}

impl AudioHeader {
    /// Header for one packet of 32-bit float planar audio.
    pub fn planar_f32(sample_rate: u32, channels: u32, samples_per_channel: u32) -> Self {
        Self {
            fourcc: FOURCC_FPA1,
            sample_rate,
            channels,
            bits_per_sample: 32,
            samples_per_channel,
            active_channels: (1u32 << channels) - 1,
        }
    }

    /// Serialize in vMix layout.
    pub fn write_to(&self, buf: &mut [u8; AUDIO_HEADER_SIZE]) {
        buf[0..4].copy_from_slice(&self.fourcc.to_le_bytes());
        buf[4..8].copy_from_slice(&self.sample_rate.to_le_bytes());
        buf[8..12].copy_from_slice(&self.samples_per_channel.to_le_bytes());
        buf[12..16].copy_from_slice(&self.channels.to_le_bytes());
        buf[16..20].copy_from_slice(&self.active_channels.to_le_bytes());
        buf[20..24].copy_from_slice(&0u32.to_le_bytes());
    }

    /// Parse either layout and validate. Returns the header and the offset
    /// where sample data begins.
    pub fn parse(payload: &[u8]) -> Result<(Self, usize), ProtocolError> {
        if payload.len() < AUDIO_HEADER_SIZE {
            return Err(ProtocolError::HeaderTruncated {
                need: AUDIO_HEADER_SIZE,
                have: payload.len(),
            });
        }

        let field = |off: usize| u32::from_le_bytes(payload[off..off + 4].try_into().unwrap());
        let fourcc = field(0);
        let sample_rate = field(4);
        let f8 = field(8);
        let f12 = field(12);
        let f16 = field(16);

        let header = if (1..=8).contains(&f8) {
            // Legacy layout. Field 12 is normally the bit depth, but a
            // known-wrong sender variant put the sample count there and the
            // bit depth at 16.
            let (bits_per_sample, samples_per_channel) = if (8..=64).contains(&f12) {
                (f12, f16)
            } else {
                (f16, f12)
            };
            Self {
                fourcc,
                sample_rate,
                channels: f8,
                bits_per_sample,
                samples_per_channel,
                active_channels: 0,
            }
        } else {
            Self {
                fourcc,
                sample_rate,
                channels: f12,
                bits_per_sample: if fourcc == FOURCC_FPA1 { 32 } else { 16 },
                samples_per_channel: f8,
                active_channels: f16,
            }
        };

        header.validate()?;
        Ok((header, AUDIO_HEADER_SIZE))
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        if !(4000..=192_000).contains(&self.sample_rate) {
            return Err(ProtocolError::BadAudioHeader(format!(
                "sample rate {} out of range",
                self.sample_rate
            )));
        }
        if !(1..=8).contains(&self.channels) {
            return Err(ProtocolError::BadAudioHeader(format!(
                "channel count {} out of range",
                self.channels
            )));
        }
        if !(8..=64).contains(&self.bits_per_sample) {
            return Err(ProtocolError::BadAudioHeader(format!(
                "bit depth {} out of range",
                self.bits_per_sample
            )));
        }
        if self.samples_per_channel == 0 {
            return Err(ProtocolError::BadAudioHeader(format!(
                "empty packet ({})",
                fourcc_to_string(self.fourcc)
            )));
        }
        Ok(())
    }

    /// Expected sample-data length in bytes.
    pub fn data_len(&self) -> usize {
        self.samples_per_channel as usize * self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

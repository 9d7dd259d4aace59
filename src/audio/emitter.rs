//! Planar-float audio packetization
//!
//! The sender captures interleaved stereo f32 at a fixed 20 ms cadence and
//! ships it as FPA1: channel-contiguous planes in one packet. The receiver
//! does the reverse, handing interleaved samples to the playback callback.
//! Device I/O lives behind the `CaptureSource` trait; this crate never
//! opens an audio device.

use crate::error::AudioError;

/// Blocking source of interleaved f32 samples (a microphone, a loopback
/// capture, a test tone).
pub trait CaptureSource: Send {
    /// Fill `interleaved` completely. Returns the number of samples per
    /// channel produced; 0 means the source has ended.
    fn read(&mut self, interleaved: &mut [f32]) -> Result<usize, AudioError>;
}

/// Re-packs interleaved f32 into a planar FPA1 payload without
/// reallocating between packets.
pub struct PlanarPacker {
    channels: usize,
    samples_per_channel: usize,
    bytes: Vec<u8>,
}

impl PlanarPacker {
    pub fn new(channels: usize, samples_per_channel: usize) -> Self {
        Self {
            channels,
            samples_per_channel,
            bytes: vec![0u8; channels * samples_per_channel * 4],
        }
    }

    /// `[L0,R0,L1,R1,…]` → `[L0…Ln | R0…Rn]` as little-endian f32 bytes.
    pub fn pack(&mut self, interleaved: &[f32]) -> &[u8] {
        debug_assert_eq!(interleaved.len(), self.channels * self.samples_per_channel);
        for ch in 0..self.channels {
            let plane = ch * self.samples_per_channel * 4;
            for i in 0..self.samples_per_channel {
                let sample = interleaved[i * self.channels + ch];
                let dst = plane + i * 4;
                self.bytes[dst..dst + 4].copy_from_slice(&sample.to_le_bytes());
            }
        }
        &self.bytes
    }

    pub fn payload_len(&self) -> usize {
        self.bytes.len()
    }
}

/// Planar FPA1 payload bytes → interleaved f32 samples.
///
/// `out` is resized to `samples_per_channel * channels`.
pub fn planar_to_interleaved_f32(
    data: &[u8],
    channels: usize,
    samples_per_channel: usize,
    out: &mut Vec<f32>,
) -> Result<(), AudioError> {
    let need = channels * samples_per_channel * 4;
    if data.len() < need {
        return Err(AudioError::InvalidFormat(format!(
            "planar payload {} bytes, need {need}",
            data.len()
        )));
    }

    out.resize(channels * samples_per_channel, 0.0);
    for ch in 0..channels {
        let plane = ch * samples_per_channel * 4;
        for i in 0..samples_per_channel {
            let src = plane + i * 4;
            out[i * channels + ch] =
                f32::from_le_bytes(data[src..src + 4].try_into().unwrap());
        }
    }
    Ok(())
}

/// Little-endian 16-bit PCM payload bytes → interleaved i16 samples.
pub fn pcm16_to_interleaved(
    data: &[u8],
    channels: usize,
    samples_per_channel: usize,
    out: &mut Vec<i16>,
) -> Result<(), AudioError> {
    let need = channels * samples_per_channel * 2;
    if data.len() < need {
        return Err(AudioError::InvalidFormat(format!(
            "pcm16 payload {} bytes, need {need}",
            data.len()
        )));
    }

    out.resize(channels * samples_per_channel, 0);
    for (i, sample) in out.iter_mut().enumerate() {
        *sample = i16::from_le_bytes(data[i * 2..i * 2 + 2].try_into().unwrap());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_splits_planes() {
        let mut packer = PlanarPacker::new(2, 3);
        let interleaved = [1.0f32, -1.0, 2.0, -2.0, 3.0, -3.0];
        let bytes = packer.pack(&interleaved);
        assert_eq!(bytes.len(), 2 * 3 * 4);

        let read =
            |off: usize| f32::from_le_bytes(bytes[off * 4..off * 4 + 4].try_into().unwrap());
        // Left plane then right plane.
        assert_eq!([read(0), read(1), read(2)], [1.0, 2.0, 3.0]);
        assert_eq!([read(3), read(4), read(5)], [-1.0, -2.0, -3.0]);
    }

    #[test]
    fn test_pack_unpack_restores_interleaving() {
        let samples = 960;
        let mut packer = PlanarPacker::new(2, samples);
        let interleaved: Vec<f32> = (0..samples * 2).map(|i| i as f32 * 0.001).collect();
        let bytes = packer.pack(&interleaved).to_vec();

        let mut out = Vec::new();
        planar_to_interleaved_f32(&bytes, 2, samples, &mut out).unwrap();
        assert_eq!(out, interleaved);
    }

    #[test]
    fn test_unpack_rejects_short_payload() {
        let mut out = Vec::new();
        assert!(planar_to_interleaved_f32(&[0u8; 16], 2, 960, &mut out).is_err());
    }

    #[test]
    fn test_pcm16_unpack() {
        let samples: [i16; 4] = [100, -100, 2000, -32768];
        let mut data = Vec::new();
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }

        let mut out = Vec::new();
        pcm16_to_interleaved(&data, 2, 2, &mut out).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn test_packer_buffer_is_stable() {
        let mut packer = PlanarPacker::new(2, 960);
        let interleaved = vec![0.5f32; 1920];
        let ptr = packer.pack(&interleaved).as_ptr();
        let ptr2 = packer.pack(&interleaved).as_ptr();
        assert_eq!(ptr, ptr2);
        assert_eq!(packer.payload_len(), 960 * 2 * 4);
    }
}

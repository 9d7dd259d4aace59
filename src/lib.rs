//! # OMT Peer
//!
//! Open Media Transport endpoint: publish a live video+audio stream over
//! framed TCP, or subscribe to one and decode it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── SENDER ────────────────────────────────┐
//! │  Camera frames (NV12)          Audio capture (f32 interleaved)     │
//! │        │                              │                            │
//! │        ▼                              ▼                            │
//! │  ┌───────────────┐            ┌──────────────┐                     │
//! │  │  Frame slot   │            │ PlanarPacker │                     │
//! │  │ (double buf)  │            │  (FPA1)      │                     │
//! │  └──────┬────────┘            └──────┬───────┘                     │
//! │         ▼                            │                             │
//! │  ┌───────────────┐                   │                             │
//! │  │ Encoder loop  │  VMX1 / NV12      │                             │
//! │  └──────┬────────┘                   │                             │
//! │         ▼                            ▼                             │
//! │  ┌────────────────────────────────────────────┐                    │
//! │  │  Fan-out to subscribed sessions (per-      │                    │
//! │  │  session write lock, eviction on error)    │                    │
//! │  └────────────────────┬───────────────────────┘                    │
//! └───────────────────────┼────────────────────────────────────────────┘
//!                         │  framed TCP (_omt._tcp. via DNS-SD)
//! ┌───────────────────────┼────────────────────────────────────────────┐
//! │  ┌────────────────────▼───────────────────────┐                    │
//! │  │  Receive thread: parse, demux, decode      │                    │
//! │  └───────┬───────────────────────┬────────────┘                    │
//! │          ▼                       ▼                                 │
//! │  ┌──────────────┐       ┌─────────────────┐                        │
//! │  │  Frame pool  │       │ De-planarize    │                        │
//! │  │ (triple buf) │       │ audio → sink    │                        │
//! │  └──────┬───────┘       └─────────────────┘                        │
//! │         ▼                                                          │
//! │  Render thread → video callback               RECEIVER             │
//! └────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod discovery;
pub mod error;
pub mod events;
pub mod network;
pub mod protocol;
pub mod video;

pub use error::{Error, Result};
pub use events::{ErrorKind, SenderStats, SourceEvent};
pub use network::{Receiver, ReceiverConfig, ReceiverHandler, Source, SourceConfig};

use std::sync::OnceLock;
use std::time::Instant;

/// Application-wide constants
pub mod constants {
    /// Default TCP port for a source
    pub const DEFAULT_PORT: u16 = 6500;

    /// Port space scanned when the default is taken
    pub const PORT_RANGE: std::ops::RangeInclusive<u16> = 6400..=6600;

    /// Audio sample rate
    pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

    /// Audio channel count (stereo)
    pub const AUDIO_CHANNELS: u32 = 2;

    /// Samples per channel in one audio packet (20 ms at 48 kHz)
    pub const AUDIO_SAMPLES_PER_PACKET: u32 = 960;
}

/// Monotonic timestamp in 100-nanosecond ticks.
///
/// The epoch is process start; peers treat the value as opaque.
pub fn ticks_100ns() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = *EPOCH.get_or_init(Instant::now);
    (epoch.elapsed().as_nanos() / 100) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_are_monotonic() {
        let a = ticks_100ns();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = ticks_100ns();
        // 2 ms is 20_000 ticks.
        assert!(b >= a + 10_000, "{a} -> {b}");
    }
}

//! OMT Receiver Demo
//!
//! Connects to a source, decodes the stream, and logs frame and audio
//! statistics once per second.

use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use omt_peer::video::RgbaFrame;
use omt_peer::{constants, Receiver, ReceiverConfig, ReceiverHandler};

#[derive(Default)]
struct StatsHandler {
    video_frames: AtomicU64,
    audio_packets: AtomicU64,
    last_width: AtomicU64,
    last_height: AtomicU64,
}

impl ReceiverHandler for StatsHandler {
    fn on_video(&self, frame: &RgbaFrame) {
        self.video_frames.fetch_add(1, Ordering::Relaxed);
        self.last_width.store(frame.width as u64, Ordering::Relaxed);
        self.last_height.store(frame.height as u64, Ordering::Relaxed);
    }

    fn on_audio_f32(&self, _interleaved: &[f32], _sample_rate: u32, _channels: u32) {
        self.audio_packets.fetch_add(1, Ordering::Relaxed);
    }

    fn on_audio_i16(&self, _interleaved: &[i16], _sample_rate: u32, _channels: u32) {
        self.audio_packets.fetch_add(1, Ordering::Relaxed);
    }

    fn on_status(&self, status: &str) {
        tracing::info!(status, "source status");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = std::env::args()
        .nth(2)
        .map(|p| p.parse())
        .transpose()?
        .unwrap_or(constants::DEFAULT_PORT);

    tracing::info!(%host, port, "connecting");
    let handler = Arc::new(StatsHandler::default());
    let receiver = Receiver::connect(ReceiverConfig::new(host, port), handler.clone())?;

    let mut last_video = 0u64;
    let mut last_audio = 0u64;
    while receiver.is_running() {
        std::thread::sleep(Duration::from_secs(1));

        let video = handler.video_frames.load(Ordering::Relaxed);
        let audio = handler.audio_packets.load(Ordering::Relaxed);
        tracing::info!(
            fps = video - last_video,
            audio_pps = audio - last_audio,
            width = handler.last_width.load(Ordering::Relaxed),
            height = handler.last_height.load(Ordering::Relaxed),
            "receiving"
        );
        last_video = video;
        last_audio = audio;
    }

    tracing::info!("receiver stopped");
    Ok(())
}

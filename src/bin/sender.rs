//! OMT Sender Demo
//!
//! Publishes a synthetic moving-gradient video stream with a test tone so
//! any OMT receiver (this crate's, vMix, OMT Viewer) has something to show.

use anyhow::Result;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use omt_peer::audio::CaptureSource;
use omt_peer::error::AudioError;
use omt_peer::video::PlaneRef;
use omt_peer::{constants, SourceConfig, SourceEvent};

const WIDTH: usize = 1280;
const HEIGHT: usize = 720;
const FPS: u64 = 30;

/// 440 Hz stereo test tone paced at the capture cadence.
struct ToneSource {
    phase: f32,
    next_deadline: Option<Instant>,
}

impl ToneSource {
    fn new() -> Self {
        Self {
            phase: 0.0,
            next_deadline: None,
        }
    }
}

impl CaptureSource for ToneSource {
    fn read(&mut self, interleaved: &mut [f32]) -> std::result::Result<usize, AudioError> {
        let samples = interleaved.len() / 2;
        let period = Duration::from_micros(
            samples as u64 * 1_000_000 / constants::AUDIO_SAMPLE_RATE as u64,
        );

        // Pace like a real capture device: one packet per period.
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        self.next_deadline = Some(deadline.max(now) + period);

        let step = 440.0 * 2.0 * std::f32::consts::PI / constants::AUDIO_SAMPLE_RATE as f32;
        for frame in interleaved.chunks_exact_mut(2) {
            let value = self.phase.sin() * 0.2;
            frame[0] = value;
            frame[1] = value;
            self.phase += step;
        }
        self.phase %= 2.0 * std::f32::consts::PI;
        Ok(samples)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port: u16 = std::env::args()
        .nth(1)
        .map(|p| p.parse())
        .transpose()?
        .unwrap_or(constants::DEFAULT_PORT);
    let name = std::env::args().nth(2).unwrap_or_else(|| "Test Pattern".to_string());

    let config = SourceConfig {
        port,
        name: name.clone(),
        ..SourceConfig::default()
    };
    let (source, events) = omt_peer::Source::start(config, Some(Box::new(ToneSource::new())))?;

    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    tracing::info!(
        "advertise as {:?} on port {}",
        omt_peer::discovery::instance_name(&host, &name),
        source.port()
    );

    // Drain status events on a side thread.
    std::thread::spawn(move || {
        for event in events {
            match event {
                SourceEvent::Listening(port) => tracing::info!(port, "listening"),
                SourceEvent::ClientConnected(peer) => tracing::info!(%peer, "client connected"),
                SourceEvent::ClientDisconnected => tracing::info!("client disconnected"),
                SourceEvent::Stats(stats) => tracing::info!(
                    fps = stats.fps,
                    clients = stats.clients,
                    codec = stats.codec,
                    "stats"
                ),
                SourceEvent::Error(kind, detail) => {
                    tracing::warn!(?kind, %detail, "source error")
                }
            }
        }
    });

    // Synthetic camera: a gradient that scrolls one step per frame.
    let slot = source.frame_slot();
    let mut y_plane = vec![0u8; WIDTH * HEIGHT];
    let mut uv_plane = vec![128u8; WIDTH * (HEIGHT / 2)];
    let frame_period = Duration::from_micros(1_000_000 / FPS);
    let mut offset = 0usize;

    tracing::info!("streaming {}x{} at {} fps - press Ctrl+C to stop", WIDTH, HEIGHT, FPS);
    loop {
        let started = Instant::now();

        for row in 0..HEIGHT {
            for col in 0..WIDTH {
                y_plane[row * WIDTH + col] = ((col + row + offset) & 0xFF) as u8;
            }
        }
        for pair in uv_plane.chunks_exact_mut(2) {
            pair[0] = ((offset * 2) & 0xFF) as u8;
            pair[1] = (255 - ((offset * 2) & 0xFF)) as u8;
        }
        offset = offset.wrapping_add(2);

        slot.submit(
            PlaneRef {
                data: &y_plane,
                row_stride: WIDTH,
                pixel_stride: 1,
            },
            PlaneRef {
                data: &uv_plane,
                row_stride: WIDTH,
                pixel_stride: 2,
            },
            PlaneRef {
                data: &uv_plane[1..],
                row_stride: WIDTH,
                pixel_stride: 2,
            },
            WIDTH,
            HEIGHT,
        );

        if let Some(remaining) = frame_period.checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }
}

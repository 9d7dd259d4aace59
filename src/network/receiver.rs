//! OMT receiver: one connection, demux, decode, render hand-off
//!
//! The receive thread parses frames off the socket and decodes video into
//! pool buffers; the render thread polls the pool's pending slot at
//! display rate and invokes the video callback. Audio is de-planarized
//! and handed to the callback inline on the receive thread.

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::audio::{pcm16_to_interleaved, planar_to_interleaved_f32};
use crate::codec::{self, nv12_to_rgba, VmxDecoder};
use crate::error::{Error, NetworkError, Result};
use crate::protocol::{
    self, fourcc_to_string, metadata, AudioHeader, FrameType, VideoHeader, FOURCC_FPA1,
    FOURCC_NV12, FOURCC_VMX1,
};
use crate::video::{FramePool, RgbaFrame};

/// Connect and read timeouts
const RECEIVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Render thread poll interval (~140 Hz, comfortably above display rate)
const RENDER_POLL: Duration = Duration::from_millis(7);

/// Minimum gap between repeated drop warnings
const WARN_INTERVAL: Duration = Duration::from_secs(1);

/// Callbacks invoked by the receiver's worker threads.
///
/// `on_video` runs on the render thread; the rest run on the receive
/// thread. None of them may block for long — audio in particular should be
/// queued to the playback device, never waited on.
pub trait ReceiverHandler: Send + Sync {
    fn on_video(&self, _frame: &RgbaFrame) {}
    fn on_audio_f32(&self, _interleaved: &[f32], _sample_rate: u32, _channels: u32) {}
    fn on_audio_i16(&self, _interleaved: &[i16], _sample_rate: u32, _channels: u32) {}
    fn on_status(&self, _status: &str) {}
}

/// Receiver configuration
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub host: String,
    pub port: u16,
    /// Requested stream quality, sent as `OMTSettings`.
    pub quality: String,
    /// VMX decoder thread count.
    pub decoder_threads: i32,
}

impl ReceiverConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            quality: "Default".to_string(),
            decoder_threads: 2,
        }
    }
}

/// A running receiver session
pub struct Receiver {
    running: Arc<AtomicBool>,
    stream: TcpStream,
    recv_thread: Option<JoinHandle<()>>,
    render_thread: Option<JoinHandle<()>>,
}

impl Receiver {
    /// Connect, subscribe to all substreams, and start the worker threads.
    pub fn connect(config: ReceiverConfig, handler: Arc<dyn ReceiverHandler>) -> Result<Self> {
        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| Error::Network(NetworkError::ConnectionFailed(e.to_string())))?
            .next()
            .ok_or_else(|| {
                Error::Network(NetworkError::ConnectionFailed(format!(
                    "no address for {}:{}",
                    config.host, config.port
                )))
            })?;

        let stream = TcpStream::connect_timeout(&addr, RECEIVER_TIMEOUT)
            .map_err(|e| Error::Network(NetworkError::ConnectionFailed(e.to_string())))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(RECEIVER_TIMEOUT))?;
        tracing::info!(%addr, "connected to source");

        // Declare interest in everything, then our preferred quality.
        {
            let mut w = &stream;
            for text in [
                metadata::subscribe_metadata(),
                metadata::subscribe_video(),
                metadata::subscribe_audio(),
                metadata::settings(&config.quality),
            ] {
                protocol::write_frame(
                    &mut w,
                    FrameType::Metadata,
                    crate::ticks_100ns(),
                    &[],
                    text.as_bytes(),
                )?;
            }
        }

        let running = Arc::new(AtomicBool::new(true));
        let pool = Arc::new(FramePool::new(4));

        let recv_thread = {
            let running = running.clone();
            let pool = pool.clone();
            let handler = handler.clone();
            let stream = stream.try_clone()?;
            let threads = config.decoder_threads;
            std::thread::Builder::new()
                .name("omt-receive".into())
                .spawn(move || recv_loop(stream, running, pool, handler, threads))
                .map_err(|e| Error::Config(e.to_string()))?
        };

        let render_thread = {
            let running = running.clone();
            std::thread::Builder::new()
                .name("omt-render".into())
                .spawn(move || render_loop(running, pool, handler))
                .map_err(|e| Error::Config(e.to_string()))?
        };

        Ok(Self {
            running,
            stream,
            recv_thread: Some(recv_thread),
            render_thread: Some(render_thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop both threads and close the socket.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        for handle in [self.recv_thread.take(), self.render_thread.take()]
            .into_iter()
            .flatten()
        {
            let _ = handle.join();
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn recv_loop(
    stream: TcpStream,
    running: Arc<AtomicBool>,
    pool: Arc<FramePool>,
    handler: Arc<dyn ReceiverHandler>,
    decoder_threads: i32,
) {
    let mut decoder: Option<VmxDecoder> = None;
    let mut vmx_unavailable_reported = false;
    let mut last_drop_warn = Instant::now() - WARN_INTERVAL;
    let mut audio_f32: Vec<f32> = Vec::new();
    let mut audio_i16: Vec<i16> = Vec::new();

    let mut reader = &stream;
    while running.load(Ordering::Acquire) {
        let frame = match protocol::read_frame(&mut reader) {
            Ok(frame) => frame,
            Err(Error::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(e) => {
                if running.swap(false, Ordering::AcqRel) {
                    tracing::info!(error = %e, "receive loop ended");
                    handler.on_status("connection lost");
                }
                break;
            }
        };

        match frame.frame_type {
            FrameType::Metadata => {
                let text = metadata::payload_text(&frame.payload);
                if metadata::is_tally(&text) {
                    handler.on_status(&text);
                }
            }
            FrameType::Video => {
                handle_video(
                    &frame.payload,
                    frame.timestamp,
                    &pool,
                    &handler,
                    &mut decoder,
                    decoder_threads,
                    &mut vmx_unavailable_reported,
                    &mut last_drop_warn,
                );
            }
            FrameType::Audio => {
                handle_audio(
                    &frame.payload,
                    &handler,
                    &mut audio_f32,
                    &mut audio_i16,
                    &mut last_drop_warn,
                );
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_video(
    payload: &[u8],
    timestamp: u64,
    pool: &FramePool,
    handler: &Arc<dyn ReceiverHandler>,
    decoder: &mut Option<VmxDecoder>,
    decoder_threads: i32,
    vmx_unavailable_reported: &mut bool,
    last_drop_warn: &mut Instant,
) {
    let (header, offset) = match VideoHeader::parse(payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            rate_limited_warn(last_drop_warn, || {
                tracing::warn!(error = %e, "dropping video frame with bad header")
            });
            return;
        }
    };
    let width = header.width as usize;
    let height = header.height as usize;
    let data = &payload[offset..];

    match header.fourcc {
        FOURCC_VMX1 => {
            if !codec::can_decode() {
                if !*vmx_unavailable_reported {
                    *vmx_unavailable_reported = true;
                    handler.on_status("Cannot decode VMX1 (codec unavailable)");
                }
                return;
            }

            let matches = decoder
                .as_ref()
                .is_some_and(|d| d.width() as usize == width && d.height() as usize == height);
            if !matches {
                *decoder =
                    match VmxDecoder::new(header.width, header.height, decoder_threads) {
                        Ok(d) => Some(d),
                        Err(e) => {
                            tracing::warn!(error = %e, "decoder init failed");
                            return;
                        }
                    };
            }

            let mut buffer = pool.acquire(width, height);
            match decoder.as_mut().unwrap().decode(data, &mut buffer.data) {
                Ok(()) => {
                    buffer.timestamp = timestamp;
                    if let Some(stale) = pool.publish(buffer) {
                        pool.release(stale);
                    }
                }
                Err(e) => {
                    rate_limited_warn(last_drop_warn, || {
                        tracing::warn!(error = %e, "VMX decode failed, dropping frame")
                    });
                    pool.release(buffer);
                }
            }
        }
        FOURCC_NV12 => {
            let y_len = width * height;
            let uv_len = width * (height / 2);
            if data.len() < y_len + uv_len {
                rate_limited_warn(last_drop_warn, || {
                    tracing::warn!(
                        have = data.len(),
                        need = y_len + uv_len,
                        "short NV12 payload, dropping frame"
                    )
                });
                return;
            }

            let mut buffer = pool.acquire(width, height);
            nv12_to_rgba(
                &data[..y_len],
                &data[y_len..y_len + uv_len],
                &mut buffer.data,
                width,
                height,
            );
            buffer.timestamp = timestamp;
            if let Some(stale) = pool.publish(buffer) {
                pool.release(stale);
            }
        }
        other => {
            rate_limited_warn(last_drop_warn, || {
                tracing::warn!(fourcc = %fourcc_to_string(other), "unsupported video codec")
            });
        }
    }
}

fn handle_audio(
    payload: &[u8],
    handler: &Arc<dyn ReceiverHandler>,
    audio_f32: &mut Vec<f32>,
    audio_i16: &mut Vec<i16>,
    last_drop_warn: &mut Instant,
) {
    let (header, offset) = match AudioHeader::parse(payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            rate_limited_warn(last_drop_warn, || {
                tracing::warn!(error = %e, "dropping audio frame")
            });
            return;
        }
    };
    let data = &payload[offset..];
    let channels = header.channels as usize;
    let samples = header.samples_per_channel as usize;

    match (header.fourcc, header.bits_per_sample) {
        (FOURCC_FPA1, 32) => {
            if planar_to_interleaved_f32(data, channels, samples, audio_f32).is_ok() {
                handler.on_audio_f32(audio_f32, header.sample_rate, header.channels);
            }
        }
        (_, 16) => {
            if pcm16_to_interleaved(data, channels, samples, audio_i16).is_ok() {
                handler.on_audio_i16(audio_i16, header.sample_rate, header.channels);
            }
        }
        (fourcc, bits) => {
            rate_limited_warn(last_drop_warn, || {
                tracing::warn!(
                    fourcc = %fourcc_to_string(fourcc),
                    bits,
                    "unsupported audio format"
                )
            });
        }
    }
}

fn render_loop(running: Arc<AtomicBool>, pool: Arc<FramePool>, handler: Arc<dyn ReceiverHandler>) {
    while running.load(Ordering::Acquire) {
        match pool.take() {
            Some(frame) => {
                handler.on_video(&frame);
                pool.release(frame);
            }
            None => std::thread::sleep(RENDER_POLL),
        }
    }
}

fn rate_limited_warn(last: &mut Instant, warn: impl FnOnce()) {
    if last.elapsed() >= WARN_INTERVAL {
        *last = Instant::now();
        warn();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::server::{Source, SourceConfig};
    use crate::video::PlaneRef;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingHandler {
        video_frames: AtomicUsize,
        audio_packets: AtomicUsize,
        statuses: Mutex<Vec<String>>,
        last_pixel: Mutex<Option<[u8; 4]>>,
    }

    impl ReceiverHandler for CountingHandler {
        fn on_video(&self, frame: &RgbaFrame) {
            self.video_frames.fetch_add(1, Ordering::Relaxed);
            let mut px = [0u8; 4];
            px.copy_from_slice(&frame.data[..4]);
            *self.last_pixel.lock().unwrap() = Some(px);
        }

        fn on_audio_f32(&self, interleaved: &[f32], sample_rate: u32, channels: u32) {
            assert_eq!(sample_rate, 48_000);
            assert_eq!(channels, 2);
            assert_eq!(interleaved.len(), 960 * 2);
            self.audio_packets.fetch_add(1, Ordering::Relaxed);
        }

        fn on_status(&self, status: &str) {
            self.statuses.lock().unwrap().push(status.to_string());
        }
    }

    fn white_frame(slot: &crate::video::FrameSlot, width: usize, height: usize) {
        let y = vec![235u8; width * height];
        let uv = vec![128u8; width * (height / 2)];
        slot.submit(
            PlaneRef {
                data: &y,
                row_stride: width,
                pixel_stride: 1,
            },
            PlaneRef {
                data: &uv,
                row_stride: width,
                pixel_stride: 2,
            },
            PlaneRef {
                data: &uv[1..],
                row_stride: width,
                pixel_stride: 2,
            },
            width,
            height,
        );
    }

    struct Tone;
    impl crate::audio::CaptureSource for Tone {
        fn read(
            &mut self,
            interleaved: &mut [f32],
        ) -> std::result::Result<usize, crate::error::AudioError> {
            std::thread::sleep(Duration::from_millis(20));
            for (i, s) in interleaved.iter_mut().enumerate() {
                *s = ((i / 2) as f32 * 0.01).sin() * 0.25;
            }
            Ok(interleaved.len() / 2)
        }
    }

    #[test]
    fn test_end_to_end_video_and_audio() {
        if codec::available() {
            // With a real libvmx the pixel assertions below would depend on
            // codec quality; this test pins the NV12 path.
            return;
        }

        let config = SourceConfig {
            port: 0,
            allow_loopback: true,
            ..SourceConfig::default()
        };
        let (mut source, _events) = Source::start(config, Some(Box::new(Tone))).unwrap();

        let handler = Arc::new(CountingHandler::default());
        let mut receiver = Receiver::connect(
            ReceiverConfig::new("127.0.0.1", source.port()),
            handler.clone(),
        )
        .unwrap();

        let slot = source.frame_slot();
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            white_frame(&slot, 32, 16);
            std::thread::sleep(Duration::from_millis(20));
            if handler.video_frames.load(Ordering::Relaxed) >= 3
                && handler.audio_packets.load(Ordering::Relaxed) >= 3
            {
                break;
            }
        }

        assert!(handler.video_frames.load(Ordering::Relaxed) >= 3);
        assert!(handler.audio_packets.load(Ordering::Relaxed) >= 3);

        // Limited-range white decodes to white within rounding.
        let px = handler.last_pixel.lock().unwrap().unwrap();
        for c in &px[..3] {
            assert!(*c >= 254, "pixel {px:?}");
        }
        assert_eq!(px[3], 0xFF);

        // The greeting tally surfaced as a status.
        let statuses = handler.statuses.lock().unwrap();
        assert!(statuses.iter().any(|s| s.to_ascii_lowercase().contains("tally")));
        drop(statuses);

        receiver.stop();
        source.stop();
    }

    #[test]
    fn test_connection_lost_status() {
        let config = SourceConfig {
            port: 0,
            allow_loopback: true,
            ..SourceConfig::default()
        };
        let (mut source, _events) = Source::start(config, None).unwrap();

        let handler = Arc::new(CountingHandler::default());
        let receiver = Receiver::connect(
            ReceiverConfig::new("127.0.0.1", source.port()),
            handler.clone(),
        )
        .unwrap();

        source.stop();

        let deadline = Instant::now() + Duration::from_secs(3);
        while receiver.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!receiver.is_running());

        let statuses = handler.statuses.lock().unwrap();
        let lost = statuses.iter().filter(|s| s.contains("connection lost")).count();
        assert_eq!(lost, 1, "exactly one connection-lost status: {statuses:?}");
    }

    #[test]
    fn test_connect_refused() {
        let handler = Arc::new(CountingHandler::default());
        // A port from the dynamic range with nothing listening.
        let result = Receiver::connect(ReceiverConfig::new("127.0.0.1", 1), handler);
        assert!(result.is_err());
    }
}

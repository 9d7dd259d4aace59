//! OMT source: listener, session set, encoder loop, audio emitter
//!
//! The accept thread owns the listening socket, one reader thread runs per
//! session, the encoder thread drains the producer slot and fans frames
//! out, and the audio thread does the same at its own 20 ms cadence.
//! Fan-out never holds the session-set lock across a socket write: it
//! snapshots the set, then writes under each session's own lock.

use crossbeam_channel::Receiver;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::audio::{CaptureSource, PlanarPacker};
use crate::codec::{self, VmxEncoder};
use crate::error::{Error, NetworkError, Result};
use crate::events::{ErrorKind, EventSink, SenderStats, SourceEvent};
use crate::network::session::Session;
use crate::protocol::{
    metadata, AudioHeader, FrameType, TallyState, VideoHeader, AUDIO_HEADER_SIZE, FOURCC_NV12,
    FOURCC_VMX1, VIDEO_HEADER_SIZE,
};
use crate::video::FrameSlot;

use crate::constants::{
    AUDIO_CHANNELS, AUDIO_SAMPLES_PER_PACKET, AUDIO_SAMPLE_RATE, DEFAULT_PORT, PORT_RANGE,
};

/// Keepalive and stats cadence
const TICK_INTERVAL: Duration = Duration::from_secs(3);

/// How long the encoder waits on the slot before checking housekeeping
const SLOT_WAIT: Duration = Duration::from_millis(100);

/// Source configuration
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Fixed port, or 0 to scan `PORT_RANGE`.
    pub port: u16,
    /// Source name used in the DNS-SD instance name and `OMTInfo`.
    pub name: String,
    /// Frame rate advertised in video headers.
    pub frame_rate_num: i32,
    pub frame_rate_den: i32,
    /// Use the VMX codec when the library is present. Off forces raw NV12
    /// regardless of what the probe finds.
    pub use_vmx: bool,
    /// VMX encoder thread count.
    pub encoder_threads: i32,
    /// Whether the audio emitter starts enabled.
    pub audio_enabled: bool,
    /// Accept loopback peers. Off by default: the only expected loopback
    /// connection is the sender's own reachability probe.
    pub allow_loopback: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            name: "Camera".to_string(),
            frame_rate_num: 30,
            frame_rate_den: 1,
            use_vmx: true,
            encoder_threads: 2,
            audio_enabled: true,
            allow_loopback: false,
        }
    }
}

struct Shared {
    running: AtomicBool,
    sessions: RwLock<Vec<Arc<Session>>>,
    tally: Mutex<TallyState>,
    audio_enabled: AtomicBool,
    events: EventSink,
    total_frames: AtomicU64,
}

impl Shared {
    fn tally(&self) -> TallyState {
        *self.tally.lock().unwrap()
    }

    fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().unwrap().clone()
    }

    fn add_session(&self, session: Arc<Session>) {
        self.sessions.write().unwrap().push(session);
    }

    fn remove_session(&self, target: &Arc<Session>) {
        target.close();
        let mut sessions = self.sessions.write().unwrap();
        if let Some(pos) = sessions.iter().position(|s| Arc::ptr_eq(s, target)) {
            sessions.remove(pos);
            drop(sessions);
            self.events.emit(SourceEvent::ClientDisconnected);
        }
    }

    /// Write one frame to every session passing `pred`, evicting peers
    /// whose sockets are gone.
    fn fan_out(
        &self,
        pred: impl Fn(&Session) -> bool,
        frame_type: FrameType,
        timestamp: u64,
        extended: &[u8],
        parts: &[&[u8]],
    ) {
        for session in self.snapshot() {
            if !session.is_connected() || !pred(&session) {
                continue;
            }
            if let Err(e) = session.send_frame_parts(frame_type, timestamp, extended, parts) {
                if Session::write_error_evicts(&e) {
                    tracing::debug!(peer = %session.peer(), error = %e, "evicting session");
                    self.remove_session(&session);
                } else {
                    self.events
                        .emit(SourceEvent::Error(ErrorKind::SendOther, e.to_string()));
                }
            }
        }
    }

    fn broadcast_tally(&self) {
        let text = metadata::tally(self.tally());
        self.fan_out(
            |_| true,
            FrameType::Metadata,
            crate::ticks_100ns(),
            &[],
            &[text.as_bytes()],
        );
    }
}

/// A running OMT source
pub struct Source {
    shared: Arc<Shared>,
    slot: Arc<FrameSlot>,
    port: u16,
    accept_thread: Option<JoinHandle<()>>,
    encode_thread: Option<JoinHandle<()>>,
    audio_thread: Option<JoinHandle<()>>,
}

impl Source {
    /// Bind, start the worker threads, and return the source plus its
    /// event channel.
    ///
    /// `capture` feeds the audio emitter; pass `None` for a video-only
    /// source.
    pub fn start(
        config: SourceConfig,
        capture: Option<Box<dyn CaptureSource>>,
    ) -> Result<(Self, Receiver<SourceEvent>)> {
        let listener = bind(config.port)?;
        let port = listener.local_addr()?.port();

        let (events, event_rx) = EventSink::new(64);
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            sessions: RwLock::new(Vec::new()),
            tally: Mutex::new(TallyState::default()),
            audio_enabled: AtomicBool::new(config.audio_enabled),
            events,
            total_frames: AtomicU64::new(0),
        });
        let slot = Arc::new(FrameSlot::new());

        shared.events.emit(SourceEvent::Listening(port));
        tracing::info!(port, name = %config.name, "source listening");

        // One-shot reachability probe; the accept path discards it.
        let probe_addr: SocketAddr = ([127, 0, 0, 1], port).into();
        std::thread::Builder::new()
            .name("omt-probe".into())
            .spawn(move || {
                let _ = TcpStream::connect_timeout(&probe_addr, Duration::from_secs(1));
            })
            .map_err(|e| Error::Config(e.to_string()))?;

        let accept_thread = {
            let shared = shared.clone();
            let config = config.clone();
            std::thread::Builder::new()
                .name("omt-accept".into())
                .spawn(move || accept_loop(listener, shared, config))
                .map_err(|e| Error::Config(e.to_string()))?
        };

        let encode_thread = {
            let shared = shared.clone();
            let slot = slot.clone();
            let config = config.clone();
            std::thread::Builder::new()
                .name("omt-encode".into())
                .spawn(move || encode_loop(shared, slot, config))
                .map_err(|e| Error::Config(e.to_string()))?
        };

        let audio_thread = match capture {
            Some(capture) => {
                let shared = shared.clone();
                Some(
                    std::thread::Builder::new()
                        .name("omt-audio".into())
                        .spawn(move || audio_loop(shared, capture))
                        .map_err(|e| Error::Config(e.to_string()))?,
                )
            }
            None => None,
        };

        Ok((
            Self {
                shared,
                slot,
                port,
                accept_thread: Some(accept_thread),
                encode_thread: Some(encode_thread),
                audio_thread,
            },
            event_rx,
        ))
    }

    /// Port actually bound (relevant when the config asked for a scan).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The ingest slot; camera frames are submitted here from any thread.
    pub fn frame_slot(&self) -> Arc<FrameSlot> {
        self.slot.clone()
    }

    pub fn client_count(&self) -> usize {
        self.shared.sessions.read().unwrap().len()
    }

    /// Update tally and broadcast it to every connected session.
    pub fn set_tally(&self, preview: bool, program: bool) {
        {
            let mut tally = self.shared.tally.lock().unwrap();
            let next = TallyState { preview, program };
            if *tally == next {
                return;
            }
            *tally = next;
        }
        self.shared.broadcast_tally();
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        self.shared.audio_enabled.store(enabled, Ordering::Release);
    }

    /// Stop every worker and close every session.
    pub fn stop(&mut self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.slot.wake();

        // Unblock the accept loop.
        let addr: SocketAddr = ([127, 0, 0, 1], self.port).into();
        let _ = TcpStream::connect_timeout(&addr, Duration::from_millis(200));

        for session in self.shared.snapshot() {
            session.close();
        }
        self.shared.sessions.write().unwrap().clear();

        for handle in [
            self.accept_thread.take(),
            self.encode_thread.take(),
            self.audio_thread.take(),
        ]
        .into_iter()
        .flatten()
        {
            let _ = handle.join();
        }
        tracing::info!(port = self.port, "source stopped");
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind(port: u16) -> Result<TcpListener> {
    if port != 0 {
        return TcpListener::bind(("0.0.0.0", port)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                Error::Network(NetworkError::PortInUse(port))
            } else {
                Error::Network(NetworkError::BindFailed(e.to_string()))
            }
        });
    }
    for candidate in PORT_RANGE {
        if let Ok(listener) = TcpListener::bind(("0.0.0.0", candidate)) {
            return Ok(listener);
        }
    }
    Err(Error::Network(NetworkError::BindFailed(format!(
        "no free port in {:?}",
        PORT_RANGE
    ))))
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>, config: SourceConfig) {
    while shared.running.load(Ordering::Acquire) {
        let (stream, peer) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) => {
                if shared.running.load(Ordering::Acquire) {
                    tracing::warn!(error = %e, "accept failed");
                }
                continue;
            }
        };
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        if peer.ip().is_loopback() && !config.allow_loopback {
            // The self-connectivity probe, or something equally local that
            // has no business subscribing.
            tracing::debug!(%peer, "discarding loopback connection");
            continue;
        }

        let session = match Session::new(stream, peer) {
            Ok(session) => Arc::new(session),
            Err(e) => {
                tracing::warn!(%peer, error = %e, "session setup failed");
                continue;
            }
        };

        // Greeting: announce who we are, then the current tally.
        let info = metadata::info(&config.name, env!("CARGO_PKG_VERSION"));
        if session.send_metadata(&info).is_err()
            || session.send_metadata(&metadata::tally(shared.tally())).is_err()
        {
            continue;
        }

        shared.add_session(session.clone());
        shared.events.emit(SourceEvent::ClientConnected(peer));
        tracing::info!(%peer, "client connected");

        let reader_shared = shared.clone();
        let reader_session = session.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("omt-session-{peer}"))
            .spawn(move || {
                let tally_shared = reader_shared.clone();
                reader_session.reader_loop(move || tally_shared.tally());
                reader_shared.remove_session(&reader_session);
            });
        if spawned.is_err() {
            shared.remove_session(&session);
        }
    }
}

fn encode_loop(shared: Arc<Shared>, slot: Arc<FrameSlot>, config: SourceConfig) {
    let mut y = Vec::new();
    let mut uv = Vec::new();
    let mut encode_out = Vec::new();
    let mut ext = [0u8; VIDEO_HEADER_SIZE];
    let mut encoder: Option<VmxEncoder> = None;

    let mut last_tick = Instant::now();
    let mut window_frames = 0u64;
    let mut window_encode_ms = 0.0f32;
    let mut last_dims = (0usize, 0usize);
    let mut last_codec = "NV12";

    while shared.running.load(Ordering::Acquire) {
        if let Some(frame) = slot.take(&mut y, &mut uv, SLOT_WAIT) {
            let (width, height) = (frame.width, frame.height);
            last_dims = (width, height);

            let mut fourcc = FOURCC_NV12;
            let mut compressed_len = 0usize;

            if config.use_vmx && codec::available() {
                let matches = encoder
                    .as_ref()
                    .is_some_and(|e| e.width() as usize == width && e.height() as usize == height);
                if !matches {
                    encoder = match VmxEncoder::new(
                        width as i32,
                        height as i32,
                        config.encoder_threads,
                    ) {
                        Ok(e) => {
                            encode_out.resize(codec::encode_buffer_len(width, height), 0);
                            Some(e)
                        }
                        Err(e) => {
                            shared
                                .events
                                .emit(SourceEvent::Error(ErrorKind::Codec, e.to_string()));
                            None
                        }
                    };
                }

                if let Some(enc) = encoder.as_mut() {
                    let started = Instant::now();
                    match enc.encode(&y, frame.y_stride as i32, &uv, width as i32, &mut encode_out)
                    {
                        Ok(n) => {
                            fourcc = FOURCC_VMX1;
                            compressed_len = n;
                            window_encode_ms += started.elapsed().as_secs_f32() * 1000.0;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "encode failed, dropping frame");
                            shared
                                .events
                                .emit(SourceEvent::Error(ErrorKind::Codec, e.to_string()));
                            continue;
                        }
                    }
                }
            }

            last_codec = if fourcc == FOURCC_VMX1 { "VMX1" } else { "NV12" };
            let header = VideoHeader::progressive(
                fourcc,
                width as i32,
                height as i32,
                config.frame_rate_num,
                config.frame_rate_den,
            );
            header.write_to(&mut ext);

            // Snapshot-filtered fan-out; no subscribers means the frame is
            // simply consumed.
            let compressed_parts;
            let raw_parts;
            let parts: &[&[u8]] = if fourcc == FOURCC_VMX1 {
                compressed_parts = [&encode_out[..compressed_len]];
                &compressed_parts
            } else {
                raw_parts = [y.as_slice(), uv.as_slice()];
                &raw_parts
            };
            shared.fan_out(
                Session::subscribed_video,
                FrameType::Video,
                frame.timestamp,
                &ext,
                parts,
            );

            shared.total_frames.fetch_add(1, Ordering::Relaxed);
            window_frames += 1;
        }

        if last_tick.elapsed() >= TICK_INTERVAL {
            let elapsed = last_tick.elapsed().as_secs_f32();
            last_tick = Instant::now();

            // Peers that subscribed to nothing video-shaped still expect
            // traffic; a minimal tally keeps their connection warm.
            let tally_text = metadata::tally(shared.tally());
            shared.fan_out(
                |s| !s.subscribed_video(),
                FrameType::Metadata,
                crate::ticks_100ns(),
                &[],
                &[tally_text.as_bytes()],
            );

            let stats = SenderStats {
                fps: window_frames as f32 / elapsed,
                width: last_dims.0,
                height: last_dims.1,
                codec: last_codec,
                avg_encode_ms: if window_frames > 0 {
                    window_encode_ms / window_frames as f32
                } else {
                    0.0
                },
                clients: shared.sessions.read().unwrap().len(),
                total_frames: shared.total_frames.load(Ordering::Relaxed),
            };
            tracing::info!(
                fps = stats.fps,
                width = stats.width,
                height = stats.height,
                codec = stats.codec,
                avg_encode_ms = stats.avg_encode_ms,
                clients = stats.clients,
                total = stats.total_frames,
                "sender stats"
            );
            shared.events.emit(SourceEvent::Stats(stats));
            window_frames = 0;
            window_encode_ms = 0.0;
        }
    }
}

fn audio_loop(shared: Arc<Shared>, mut capture: Box<dyn CaptureSource>) {
    let samples = AUDIO_SAMPLES_PER_PACKET as usize;
    let channels = AUDIO_CHANNELS as usize;
    let mut interleaved = vec![0.0f32; samples * channels];
    let mut packer = PlanarPacker::new(channels, samples);
    let mut ext = [0u8; AUDIO_HEADER_SIZE];

    let header = AudioHeader::planar_f32(AUDIO_SAMPLE_RATE, AUDIO_CHANNELS, AUDIO_SAMPLES_PER_PACKET);
    header.write_to(&mut ext);

    while shared.running.load(Ordering::Acquire) {
        if !shared.audio_enabled.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(20));
            continue;
        }

        match capture.read(&mut interleaved) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                shared
                    .events
                    .emit(SourceEvent::Error(ErrorKind::Audio, e.to_string()));
                std::thread::sleep(Duration::from_millis(20));
                continue;
            }
        }

        let payload = packer.pack(&interleaved);
        shared.fan_out(
            Session::subscribed_audio,
            FrameType::Audio,
            crate::ticks_100ns(),
            &ext,
            &[payload],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{self, read_frame};
    use std::io::Write;

    fn test_config() -> SourceConfig {
        SourceConfig {
            port: 0,
            allow_loopback: true,
            audio_enabled: true,
            ..SourceConfig::default()
        }
    }

    fn connect(port: u16) -> TcpStream {
        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    fn subscribe(stream: &TcpStream, text: &str) {
        let mut w = stream;
        protocol::write_frame(&mut w, FrameType::Metadata, 0, &[], text.as_bytes()).unwrap();
        w.flush().unwrap();
    }

    /// Read frames until one matches; panics on timeout via read timeout.
    fn read_until(stream: &TcpStream, mut pred: impl FnMut(&protocol::Frame) -> bool) -> protocol::Frame {
        let mut r = stream;
        loop {
            let frame = read_frame(&mut r).unwrap();
            if pred(&frame) {
                return frame;
            }
        }
    }

    fn submit_gray_frame(slot: &FrameSlot, width: usize, height: usize) {
        let y = vec![0x80u8; width * height];
        let uv = vec![0x80u8; width * (height / 2)];
        slot.submit(
            crate::video::PlaneRef {
                data: &y,
                row_stride: width,
                pixel_stride: 1,
            },
            crate::video::PlaneRef {
                data: &uv,
                row_stride: width,
                pixel_stride: 2,
            },
            crate::video::PlaneRef {
                data: &uv[1..],
                row_stride: width,
                pixel_stride: 2,
            },
            width,
            height,
        );
    }

    #[test]
    fn test_greeting_info_then_tally() {
        let (mut source, _events) = Source::start(test_config(), None).unwrap();
        let client = connect(source.port());

        let first = read_frame(&mut &client).unwrap();
        assert_eq!(first.frame_type, FrameType::Metadata);
        let text = metadata::payload_text(&first.payload);
        assert!(text.contains("OMTInfo"), "got {text}");

        let second = read_frame(&mut &client).unwrap();
        let text = metadata::payload_text(&second.payload);
        assert!(metadata::is_tally(&text), "got {text}");

        source.stop();
    }

    #[test]
    fn test_video_fanout_nv12_fallback() {
        // Without libvmx the stream falls back to raw NV12 with the exact
        // plane sizes on the wire.
        if codec::available() {
            return;
        }

        let (mut source, _events) = Source::start(test_config(), None).unwrap();
        let client = connect(source.port());
        subscribe(&client, &metadata::subscribe_video());

        // Subscription races the fan-out snapshot; keep submitting.
        let slot = source.frame_slot();
        let frame = {
            let mut found = None;
            for _ in 0..50 {
                submit_gray_frame(&slot, 64, 32);
                std::thread::sleep(Duration::from_millis(20));
                let mut r = &client;
                // Drain whatever arrived; stop at the first video frame.
                loop {
                    match read_frame_nonfatal(&mut r) {
                        Some(f) if f.frame_type == FrameType::Video => {
                            found = Some(f);
                            break;
                        }
                        Some(_) => continue,
                        None => break,
                    }
                }
                if found.is_some() {
                    break;
                }
            }
            found.expect("no video frame within deadline")
        };

        let (header, offset) = VideoHeader::parse(&frame.payload).unwrap();
        assert_eq!(header.fourcc, FOURCC_NV12);
        assert_eq!(header.width, 64);
        assert_eq!(header.height, 32);
        assert_eq!(frame.payload.len() - offset, 64 * 32 + 64 * 16);

        source.stop();
    }

    fn read_frame_nonfatal(stream: &mut &TcpStream) -> Option<protocol::Frame> {
        stream.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
        let result = read_frame(stream).ok();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        result
    }

    #[test]
    fn test_audio_fanout_vmix_header() {
        struct Silence;
        impl CaptureSource for Silence {
            fn read(&mut self, interleaved: &mut [f32]) -> std::result::Result<usize, crate::error::AudioError> {
                std::thread::sleep(Duration::from_millis(20));
                interleaved.fill(0.0);
                Ok(interleaved.len() / 2)
            }
        }

        let (mut source, _events) = Source::start(test_config(), Some(Box::new(Silence))).unwrap();
        let client = connect(source.port());
        subscribe(&client, &metadata::subscribe_audio());

        let frame = read_until(&client, |f| f.frame_type == FrameType::Audio);
        let (header, offset) = AudioHeader::parse(&frame.payload).unwrap();
        assert_eq!(header.fourcc, crate::protocol::FOURCC_FPA1);
        assert_eq!(header.sample_rate, 48_000);
        assert_eq!(header.samples_per_channel, 960);
        assert_eq!(header.channels, 2);
        assert_eq!(header.active_channels, 0x03);
        assert_eq!(frame.payload.len() - offset, 960 * 2 * 4);

        source.stop();
    }

    #[test]
    fn test_idle_keepalive_tally() {
        let (mut source, _events) = Source::start(test_config(), None).unwrap();
        let client = connect(source.port());
        subscribe(&client, &metadata::subscribe_audio());

        // No video subscription: within ~2 tick intervals an OMTTally
        // keepalive must arrive beyond the greeting pair.
        let mut tally_count = 0;
        let deadline = Instant::now() + Duration::from_secs(8);
        let mut r = &client;
        while Instant::now() < deadline && tally_count < 3 {
            let frame = read_frame(&mut r).unwrap();
            if frame.frame_type == FrameType::Metadata
                && metadata::is_tally(&metadata::payload_text(&frame.payload))
            {
                tally_count += 1;
            }
        }
        assert!(tally_count >= 3, "expected repeated keepalive tallies");

        source.stop();
    }

    #[test]
    fn test_disconnect_eviction() {
        let (mut source, _events) = Source::start(test_config(), None).unwrap();
        let first = connect(source.port());
        let second = connect(source.port());
        subscribe(&first, &metadata::subscribe_video());
        subscribe(&second, &metadata::subscribe_video());

        let deadline = Instant::now() + Duration::from_secs(2);
        while source.client_count() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(source.client_count(), 2);

        drop(second);

        // The closed peer's reader notices EOF and prunes the session.
        let deadline = Instant::now() + Duration::from_secs(1);
        while source.client_count() > 1 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(source.client_count(), 1);

        // The survivor still receives video.
        let slot = source.frame_slot();
        let mut got_video = false;
        for _ in 0..50 {
            submit_gray_frame(&slot, 32, 16);
            std::thread::sleep(Duration::from_millis(20));
            let mut r = &first;
            loop {
                match read_frame_nonfatal(&mut r) {
                    Some(f) if f.frame_type == FrameType::Video => {
                        got_video = true;
                        break;
                    }
                    Some(_) => continue,
                    None => break,
                }
            }
            if got_video {
                break;
            }
        }
        assert!(got_video);

        source.stop();
    }

    #[test]
    fn test_set_tally_broadcasts() {
        let (mut source, _events) = Source::start(test_config(), None).unwrap();
        let client = connect(source.port());

        // Skip greeting.
        let _ = read_frame(&mut &client).unwrap();
        let _ = read_frame(&mut &client).unwrap();

        source.set_tally(false, true);
        let frame = read_until(&client, |f| {
            f.frame_type == FrameType::Metadata
                && metadata::is_tally(&metadata::payload_text(&f.payload))
        });
        match metadata::parse(&frame.payload) {
            crate::protocol::MetadataMessage::Tally(state) => {
                assert!(!state.preview);
                assert!(state.program);
            }
            other => panic!("unexpected message {other:?}"),
        }

        source.stop();
    }

    #[test]
    fn test_port_scan_when_unspecified() {
        let (mut source, _events) = Source::start(test_config(), None).unwrap();
        assert!(PORT_RANGE.contains(&source.port()));
        source.stop();
    }
}

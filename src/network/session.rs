//! Sender-side client session
//!
//! One per accepted connection. The session owns both directions: a
//! blocking reader loop that processes subscription metadata, and a
//! mutex-guarded buffered writer that the fan-out paths share so frames
//! never interleave mid-frame on one socket.

use std::io::{BufWriter, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Error, NetworkError, ProtocolError, Result};
use crate::protocol::{self, metadata, FrameType, TallyState};

/// Read timeout on session sockets; hitting it just re-enters the loop.
pub const SESSION_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Write timeout; a peer this slow is treated as gone.
pub const SESSION_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Userspace write buffer in front of the socket
pub const SESSION_WRITE_BUFFER: usize = 256 * 1024;

pub struct Session {
    peer: SocketAddr,
    stream: TcpStream,
    writer: Mutex<BufWriter<TcpStream>>,
    subscribed_video: AtomicBool,
    subscribed_audio: AtomicBool,
    connected: AtomicBool,
}

impl Session {
    /// Wrap an accepted socket, applying the session socket options.
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(SESSION_READ_TIMEOUT))?;
        stream.set_write_timeout(Some(SESSION_WRITE_TIMEOUT))?;

        let write_half = stream.try_clone()?;
        Ok(Self {
            peer,
            stream,
            writer: Mutex::new(BufWriter::with_capacity(SESSION_WRITE_BUFFER, write_half)),
            subscribed_video: AtomicBool::new(false),
            subscribed_audio: AtomicBool::new(false),
            connected: AtomicBool::new(true),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn subscribed_video(&self) -> bool {
        self.subscribed_video.load(Ordering::Acquire)
    }

    pub fn subscribed_audio(&self) -> bool {
        self.subscribed_audio.load(Ordering::Acquire)
    }

    /// Mark gone and shut the socket down, breaking the reader loop.
    pub fn close(&self) {
        self.connected.store(false, Ordering::Release);
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    /// Write one complete frame under the session write lock and flush.
    pub fn send_frame(
        &self,
        frame_type: FrameType,
        timestamp: u64,
        extended: &[u8],
        payload: &[u8],
    ) -> std::io::Result<()> {
        self.send_frame_parts(frame_type, timestamp, extended, &[payload])
    }

    /// As `send_frame` with a scattered payload (NV12 planes).
    pub fn send_frame_parts(
        &self,
        frame_type: FrameType,
        timestamp: u64,
        extended: &[u8],
        parts: &[&[u8]],
    ) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap();
        protocol::frame::write_frame_parts(&mut *writer, frame_type, timestamp, extended, parts)
            .map_err(io_from)?;
        writer.flush()
    }

    pub fn send_metadata(&self, text: &str) -> std::io::Result<()> {
        self.send_frame(
            FrameType::Metadata,
            crate::ticks_100ns(),
            &[],
            text.as_bytes(),
        )
    }

    /// Whether a failed write means this session should be evicted.
    ///
    /// Timeouts count: a peer that cannot drain the kernel buffer within
    /// the write timeout is gone for our purposes.
    pub fn write_error_evicts(err: &std::io::Error) -> bool {
        NetworkError::is_disconnect(err)
            || matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
    }

    /// Blocking reader loop; returns when the peer is gone.
    ///
    /// Only subscription metadata matters here. An audio subscription is
    /// answered with a fresh tally so the peer does not tear down an
    /// otherwise idle channel. Read timeouts re-enter the read.
    pub fn reader_loop(&self, current_tally: impl Fn() -> TallyState) {
        while self.is_connected() {
            let frame = match protocol::read_frame(&mut (&self.stream)) {
                Ok(frame) => frame,
                Err(Error::Io(e))
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    continue;
                }
                Err(Error::Protocol(ProtocolError::Disconnected)) => break,
                Err(e) => {
                    tracing::debug!(peer = %self.peer, error = %e, "session read failed");
                    break;
                }
            };

            if frame.frame_type != FrameType::Metadata {
                continue;
            }

            let text = metadata::payload_text(&frame.payload);
            if !metadata::is_subscribe(&text) {
                continue;
            }
            if metadata::mentions_video(&text) {
                self.subscribed_video.store(true, Ordering::Release);
                tracing::debug!(peer = %self.peer, "video subscription");
            }
            if metadata::mentions_audio(&text) {
                self.subscribed_audio.store(true, Ordering::Release);
                tracing::debug!(peer = %self.peer, "audio subscription");
                if self.send_metadata(&metadata::tally(current_tally())).is_err() {
                    break;
                }
            }
        }
        self.connected.store(false, Ordering::Release);
    }
}

fn io_from(err: Error) -> std::io::Error {
    match err {
        Error::Io(e) => e,
        other => std::io::Error::other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::read_frame;
    use std::net::TcpListener;

    fn session_pair() -> (Session, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server_side, peer) = listener.accept().unwrap();
        (Session::new(server_side, peer).unwrap(), client)
    }

    #[test]
    fn test_send_frame_reaches_peer() {
        let (session, client) = session_pair();
        session.send_metadata("<OMTTally Preview=\"false\" Program=\"false\" />").unwrap();

        let frame = read_frame(&mut &client).unwrap();
        assert_eq!(frame.frame_type, FrameType::Metadata);
        let text = metadata::payload_text(&frame.payload);
        assert!(metadata::is_tally(&text));
    }

    #[test]
    fn test_subscriptions_start_false_and_latch() {
        let (session, client) = session_pair();
        assert!(!session.subscribed_video());
        assert!(!session.subscribed_audio());

        let handle = std::thread::spawn(move || {
            session.reader_loop(TallyState::default);
            session
        });

        protocol::write_frame(
            &mut &client,
            FrameType::Metadata,
            0,
            &[],
            metadata::subscribe_video().as_bytes(),
        )
        .unwrap();
        protocol::write_frame(
            &mut &client,
            FrameType::Metadata,
            0,
            &[],
            metadata::subscribe_audio().as_bytes(),
        )
        .unwrap();

        // Audio subscription is acknowledged with a tally frame.
        let frame = read_frame(&mut &client).unwrap();
        assert!(metadata::is_tally(&metadata::payload_text(&frame.payload)));

        drop(client);
        let session = handle.join().unwrap();
        assert!(session.subscribed_video());
        assert!(session.subscribed_audio());
        assert!(!session.is_connected());
    }

    #[test]
    fn test_write_error_classification() {
        let broken = std::io::Error::from(std::io::ErrorKind::BrokenPipe);
        assert!(Session::write_error_evicts(&broken));
        let timeout = std::io::Error::from(std::io::ErrorKind::TimedOut);
        assert!(Session::write_error_evicts(&timeout));
        let perm = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(!Session::write_error_evicts(&perm));
    }

    #[test]
    fn test_session_writes_are_serialized() {
        use std::sync::Arc;

        let (session, client) = session_pair();
        let session = Arc::new(session);

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let session = session.clone();
                std::thread::spawn(move || {
                    let payload = vec![w as u8; 1000];
                    for _ in 0..25 {
                        session
                            .send_frame(FrameType::Metadata, w, &[], &payload)
                            .unwrap();
                    }
                })
            })
            .collect();

        // The peer must observe 100 complete frames, each internally
        // uniform: concurrent writers never interleave inside a frame.
        let mut seen = 0;
        let mut reader = &client;
        while seen < 100 {
            let frame = read_frame(&mut reader).unwrap();
            let first = frame.payload[0];
            assert!(frame.payload.iter().all(|&b| b == first));
            assert_eq!(frame.payload.len(), 1000);
            assert_eq!(frame.timestamp, first as u64);
            seen += 1;
        }

        for w in writers {
            w.join().unwrap();
        }
    }
}

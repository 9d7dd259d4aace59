//! Status events delivered to the embedding application
//!
//! Handlers in the original design are listener callbacks invoked from
//! arbitrary threads; here they are a bounded channel the caller drains.
//! A full channel drops the event rather than stalling a pipeline thread.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::net::SocketAddr;

/// Classification used by `SourceEvent::Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Framing,
    ShortRead,
    SendOther,
    Bind,
    Codec,
    Audio,
}

/// Events emitted by a running source
#[derive(Debug, Clone)]
pub enum SourceEvent {
    Listening(u16),
    ClientConnected(SocketAddr),
    ClientDisconnected,
    /// Periodic observational stats from the encoder loop.
    Stats(SenderStats),
    Error(ErrorKind, String),
}

/// Sender-side periodic statistics
#[derive(Debug, Clone, Default)]
pub struct SenderStats {
    pub fps: f32,
    pub width: usize,
    pub height: usize,
    pub codec: &'static str,
    pub avg_encode_ms: f32,
    pub clients: usize,
    pub total_frames: u64,
}

/// A bounded event pipe; the receiver half goes to the caller.
pub struct EventSink {
    tx: Sender<SourceEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> (Self, Receiver<SourceEvent>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }

    /// Send without blocking; a full channel loses the event.
    pub fn emit(&self, event: SourceEvent) {
        let _ = self.tx.try_send(event);
    }
}

impl Clone for EventSink {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_drain() {
        let (sink, rx) = EventSink::new(4);
        sink.emit(SourceEvent::Listening(6500));
        sink.emit(SourceEvent::ClientDisconnected);

        assert!(matches!(rx.try_recv().unwrap(), SourceEvent::Listening(6500)));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SourceEvent::ClientDisconnected
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_channel_drops_instead_of_blocking() {
        let (sink, rx) = EventSink::new(1);
        sink.emit(SourceEvent::ClientDisconnected);
        sink.emit(SourceEvent::Listening(1)); // dropped
        assert!(matches!(
            rx.try_recv().unwrap(),
            SourceEvent::ClientDisconnected
        ));
        assert!(rx.try_recv().is_err());
    }
}

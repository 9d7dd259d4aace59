//! Error types for the OMT peer

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unsupported frame version: {0}")]
    BadVersion(u8),

    #[error("Unknown frame type: {0}")]
    UnknownFrameType(u8),

    #[error("Payload length {length} exceeds limit {limit} for frame type {frame_type}")]
    PayloadTooLarge {
        frame_type: u8,
        length: u32,
        limit: u32,
    },

    #[error("Extended header truncated: need {need} bytes, have {have}")]
    HeaderTruncated { need: usize, have: usize },

    #[error("Video dimensions out of range: {width}x{height}")]
    BadDimensions { width: i32, height: i32 },

    #[error("Audio header rejected: {0}")]
    BadAudioHeader(String),

    #[error("Connection closed mid-frame")]
    Disconnected,
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("VMX library unavailable")]
    Unavailable,

    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Output buffer too small: need {need}, have {have}")]
    OutputTooSmall { need: usize, have: usize },
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Port already in use: {0}")]
    PortInUse(u16),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection lost")]
    ConnectionLost,
}

impl NetworkError {
    /// Whether an IO error means the peer is gone and the session should
    /// be evicted rather than reported.
    pub fn is_disconnect(err: &std::io::Error) -> bool {
        matches!(
            err.kind(),
            std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::NotConnected
                | std::io::ErrorKind::UnexpectedEof
        )
    }
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

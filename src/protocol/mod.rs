//! OMT wire protocol
//!
//! Framed TCP: a 16-byte base header, then a per-type extended header and
//! payload. Metadata frames double as the control channel (subscriptions,
//! tally, settings).

pub mod audio;
pub mod frame;
pub mod metadata;
pub mod video;

pub use audio::{AudioHeader, ACTIVE_CHANNELS_STEREO, AUDIO_HEADER_SIZE};
pub use frame::{read_frame, write_frame, Frame, FrameType, FRAME_HEADER_SIZE, FRAME_VERSION};
pub use metadata::{MetadataMessage, TallyState};
pub use video::{
    fourcc_to_string, VideoHeader, COLOR_SPACE_BT709, FOURCC_FPA1, FOURCC_NV12, FOURCC_VMX1,
    VIDEO_HEADER_SIZE,
};

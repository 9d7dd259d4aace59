//! Audio pipeline: planar packetization and the device trait seams

pub mod emitter;

pub use emitter::{pcm16_to_interleaved, planar_to_interleaved_f32, CaptureSource, PlanarPacker};

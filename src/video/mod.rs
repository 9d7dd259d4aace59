//! Video pipeline pieces shared by the sender and receiver

pub mod pool;
pub mod producer;

pub use pool::{FramePool, RgbaFrame};
pub use producer::{FrameSlot, PlaneRef, TakenFrame};

//! Video codec adapter
//!
//! Uniform surface over the optional external VMX library and the built-in
//! NV12 to RGBA converter, so the pipelines never care which backend a
//! frame went through.

pub mod convert;
pub mod vmx;

pub use convert::{nv12_to_rgba, swap_red_blue_in_place};
pub use vmx::{available, can_decode, encode_buffer_len, VmxDecoder, VmxEncoder};

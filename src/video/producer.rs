//! Double-buffered frame hand-off between camera ingest and the encoder
//!
//! One slot, one mutex, one condition. The producer repacks whatever plane
//! layout the camera delivers into tight NV12 and marks the slot ready;
//! the consumer swaps the slot's buffers with its own pair and encodes
//! outside the lock. If the encoder is still busy when the next frame
//! lands, the slot is overwritten: newest wins, nothing queues.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A source image plane: base data plus row and pixel strides.
#[derive(Clone, Copy)]
pub struct PlaneRef<'a> {
    pub data: &'a [u8],
    pub row_stride: usize,
    pub pixel_stride: usize,
}

#[derive(Default)]
struct Slot {
    y: Vec<u8>,
    uv: Vec<u8>,
    width: usize,
    height: usize,
    timestamp: u64,
    ready: bool,
    overwritten: u64,
}

/// Dimensions and timestamp of a frame taken from the slot.
#[derive(Debug, Clone, Copy)]
pub struct TakenFrame {
    pub width: usize,
    pub height: usize,
    pub y_stride: usize,
    pub timestamp: u64,
}

/// The producer/encoder hand-off slot.
pub struct FrameSlot {
    slot: Mutex<Slot>,
    frame_ready: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            frame_ready: Condvar::new(),
        }
    }

    /// Ingest one camera frame on the caller's thread.
    ///
    /// Y is compacted row by row to a `width` stride. The chroma planes
    /// are packed into one interleaved UV plane: when both already have
    /// pixel stride 2 (NV12-style source) the interleaved rows are copied
    /// directly, otherwise each sample is gathered individually.
    pub fn submit(
        &self,
        y: PlaneRef<'_>,
        u: PlaneRef<'_>,
        v: PlaneRef<'_>,
        width: usize,
        height: usize,
    ) {
        let mut slot = self.slot.lock().unwrap();
        if slot.ready {
            slot.overwritten += 1;
        }

        let y_len = width * height;
        let uv_len = width * (height / 2);
        slot.y.resize(y_len, 0);
        slot.uv.resize(uv_len, 0);

        for row in 0..height {
            let src = row * y.row_stride;
            let dst = row * width;
            slot.y[dst..dst + width].copy_from_slice(&y.data[src..src + width]);
        }

        if u.pixel_stride == 2 && v.pixel_stride == 2 {
            // The U plane base already points at interleaved UV rows.
            for row in 0..height / 2 {
                let src = row * u.row_stride;
                let dst = row * width;
                slot.uv[dst..dst + width].copy_from_slice(&u.data[src..src + width]);
            }
        } else {
            for row in 0..height / 2 {
                let dst_row = row * width;
                for col in 0..width / 2 {
                    let u_idx = row * u.row_stride + col * u.pixel_stride;
                    let v_idx = row * v.row_stride + col * v.pixel_stride;
                    slot.uv[dst_row + 2 * col] = u.data.get(u_idx).copied().unwrap_or(128);
                    slot.uv[dst_row + 2 * col + 1] = v.data.get(v_idx).copied().unwrap_or(128);
                }
            }
        }

        slot.width = width;
        slot.height = height;
        slot.timestamp = crate::ticks_100ns();
        slot.ready = true;
        drop(slot);
        self.frame_ready.notify_one();
    }

    /// Wait up to `timeout` for a frame, then swap the slot's buffers with
    /// the caller's pair.
    ///
    /// The swap is what makes the steady state allocation-free: the
    /// producer reuses the consumer's previous buffers on its next
    /// `submit`. Returns `None` on timeout.
    pub fn take(
        &self,
        y: &mut Vec<u8>,
        uv: &mut Vec<u8>,
        timeout: Duration,
    ) -> Option<TakenFrame> {
        let slot = self.slot.lock().unwrap();
        let (mut slot, wait) = self
            .frame_ready
            .wait_timeout_while(slot, timeout, |s| !s.ready)
            .unwrap();
        if wait.timed_out() && !slot.ready {
            return None;
        }

        std::mem::swap(&mut slot.y, y);
        std::mem::swap(&mut slot.uv, uv);
        slot.ready = false;
        Some(TakenFrame {
            width: slot.width,
            height: slot.height,
            y_stride: slot.width,
            timestamp: slot.timestamp,
        })
    }

    /// Wake a consumer blocked in `take` (used at shutdown).
    pub fn wake(&self) {
        self.frame_ready.notify_all();
    }

    /// Frames dropped because the encoder was still busy.
    pub fn overwritten(&self) -> u64 {
        self.slot.lock().unwrap().overwritten
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

//! Triple-buffered RGBA frame pool
//!
//! Decouples the receiver's decode thread from the render thread. Decode
//! acquires a buffer, fills it, and publishes it into the single pending
//! slot; render takes the pending buffer, draws it, and releases it back.
//! Steady state is three buffers total (decoder-held, pending, renderer-
//! held) and no buffer is ever written and read at the same time.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One decoded RGBA frame
pub struct RgbaFrame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp: u64,
}

impl RgbaFrame {
    fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![0u8; width * height * 4],
            width,
            height,
            timestamp: 0,
        }
    }

    fn resize(&mut self, width: usize, height: usize) {
        self.data.resize(width * height * 4, 0);
        self.width = width;
        self.height = height;
    }
}

/// Recycling pool plus the single-slot pending cell
pub struct FramePool {
    free: ArrayQueue<RgbaFrame>,
    pending: Mutex<Option<RgbaFrame>>,
    allocated: AtomicUsize,
}

impl FramePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: ArrayQueue::new(capacity),
            pending: Mutex::new(None),
            allocated: AtomicUsize::new(0),
        }
    }

    /// Get a buffer sized for the given dimensions, recycling a free one
    /// when possible.
    pub fn acquire(&self, width: usize, height: usize) -> RgbaFrame {
        match self.free.pop() {
            Some(mut frame) => {
                if frame.width != width || frame.height != height {
                    frame.resize(width, height);
                }
                frame
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                RgbaFrame::new(width, height)
            }
        }
    }

    /// Swap a filled buffer into the pending slot. Returns the displaced
    /// frame, which the caller must `release`.
    pub fn publish(&self, frame: RgbaFrame) -> Option<RgbaFrame> {
        self.pending.lock().unwrap().replace(frame)
    }

    /// Clear and return the pending frame, if any.
    pub fn take(&self) -> Option<RgbaFrame> {
        self.pending.lock().unwrap().take()
    }

    /// Return a buffer to the pool. Dropped on the floor if the pool is
    /// already full.
    pub fn release(&self, frame: RgbaFrame) {
        let _ = self.free.push(frame);
    }

    /// Total buffers ever allocated (not pool occupancy).
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Trait for page replacement algorithms.
///
/// Eviction eligibility is decided by the caller through a predicate
/// (typically "pin count is zero"), so the replacer only tracks access
/// recency, not pin state.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    fn record_access(&self, frame_id: FrameId);

    /// Selects a victim among frames for which `can_evict` returns true.
    ///
    /// Returns None if no frame is eligible.
    fn evict(&self, can_evict: &dyn Fn(FrameId) -> bool) -> Option<FrameId>;
}

/// Clock (second-chance) replacement algorithm.
///
/// Reference bits are atomics so access recording is lock-free; only the
/// clock hand is behind a mutex.
pub struct ClockReplacer {
    /// Number of frames.
    num_frames: usize,
    /// Reference bits for each frame.
    reference_bits: Vec<AtomicBool>,
    /// Current clock hand position.
    clock_hand: Mutex<usize>,
}

impl ClockReplacer {
    /// Creates a new clock replacer with the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        let reference_bits = (0..num_frames).map(|_| AtomicBool::new(false)).collect();

        Self {
            num_frames,
            reference_bits,
            clock_hand: Mutex::new(0),
        }
    }

    /// Returns the total capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_frames
    }
}

impl Replacer for ClockReplacer {
    #[inline]
    fn record_access(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(true, Ordering::Relaxed);
        }
    }

    fn evict(&self, can_evict: &dyn Fn(FrameId) -> bool) -> Option<FrameId> {
        let mut hand = self.clock_hand.lock();

        // First rotation clears reference bits, second finds any eligible
        // frame whose bit stayed clear. Two full sweeps bound the search.
        for _ in 0..(2 * self.num_frames) {
            let pos = *hand;
            let frame_id = FrameId(pos as u32);
            *hand = (pos + 1) % self.num_frames;

            if !can_evict(frame_id) {
                continue;
            }
            if self.reference_bits[pos].load(Ordering::Relaxed) {
                // Second chance: clear the bit and move on
                self.reference_bits[pos].store(false, Ordering::Relaxed);
                continue;
            }
            return Some(frame_id);
        }

        None
    }
}

//! Per-frame GPU statistics.
//!
//! Completion handlers record one [`FrameStats`] per finished frame into a
//! shared [`FrameStatsHistory`]; the producer thread reads it back for
//! display or logging. The history is bounded: once it holds `capacity`
//! frames, the oldest entry is dropped from the front.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Measurements of one completed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    /// Monotonic frame number.
    pub frame_number: u64,
    /// Pacer slot the frame ran in.
    pub slot: usize,
    /// GPU time between the start and end of the frame's command stream.
    pub gpu_time_ms: f64,
    /// Number of passes dispatched.
    pub pass_count: usize,
}

/// Bounded, thread-safe history of [`FrameStats`].
#[derive(Debug)]
pub struct FrameStatsHistory {
    frames: Mutex<VecDeque<FrameStats>>,
    capacity: usize,
}

impl FrameStatsHistory {
    /// Create a history keeping at most `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "stats history capacity must be at least 1");
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest one when full.
    pub fn record(&self, stats: FrameStats) {
        let mut frames = self.frames.lock();
        if frames.len() == self.capacity {
            frames.pop_front();
        }
        frames.push_back(stats);
    }

    /// Most recently recorded frame.
    pub fn latest(&self) -> Option<FrameStats> {
        self.frames.lock().back().copied()
    }

    /// Mean GPU time over the retained frames.
    pub fn average_gpu_time_ms(&self) -> Option<f64> {
        let frames = self.frames.lock();
        if frames.is_empty() {
            return None;
        }
        let total: f64 = frames.iter().map(|stats| stats.gpu_time_ms).sum();
        Some(total / frames.len() as f64)
    }

    /// Maximum number of retained frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Copy of the retained frames, oldest first.
    pub fn snapshot(&self) -> Vec<FrameStats> {
        self.frames.lock().iter().copied().collect()
    }
}

static_assertions::assert_impl_all!(FrameStatsHistory: Send, Sync);

//! Bounded frames-in-flight pacing.
//!
//! [`FramePacer`] is a counting semaphore over frame slots. The producer
//! acquires a [`FrameSlot`] before building a frame; the GPU completion
//! handler of that frame's command stream hands the slot back.
//!
//! ```text
//! N = 3      acquire 0   acquire 1   acquire 2   acquire ──── blocks ───┐
//!                │                                                      │
//! completion ────┴──────────────────── release 0 ─────────────► returns 0
//! ```
//!
//! A [`FrameSlot`] is a move-only token, so one acquisition can only be
//! released once. The pacer additionally tracks a per-slot in-flight flag
//! and treats releasing a slot that is not in flight as fatal.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Token for one acquired frame slot.
///
/// Not `Clone`: it must be passed to [`FramePacer::release_slot`] exactly
/// once, normally from the completion handler of the frame it belongs to.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a frame slot must be released, or the pacer will eventually block forever"]
pub struct FrameSlot {
    index: usize,
    frame_number: u64,
}

impl FrameSlot {
    /// Slot index, `frame_number mod frames_in_flight`.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Monotonic frame number this slot was acquired for.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }
}

#[derive(Debug)]
struct PacerState {
    available: usize,
    in_flight: Vec<bool>,
    frame_number: u64,
}

impl PacerState {
    fn next_index(&self) -> usize {
        (self.frame_number % self.in_flight.len() as u64) as usize
    }

    fn can_acquire(&self) -> bool {
        self.available > 0 && !self.in_flight[self.next_index()]
    }

    fn acquire(&mut self) -> FrameSlot {
        let index = self.next_index();
        let slot = FrameSlot {
            index,
            frame_number: self.frame_number,
        };
        self.in_flight[index] = true;
        self.available -= 1;
        self.frame_number += 1;
        slot
    }
}

/// Counting semaphore bounding the number of frames in flight.
///
/// # Thread Safety
///
/// `FramePacer` is `Send + Sync`. Share it as `Arc<FramePacer>` between the
/// frame producer and the completion thread.
#[derive(Debug)]
pub struct FramePacer {
    state: Mutex<PacerState>,
    released: Condvar,
    frames_in_flight: usize,
}

impl FramePacer {
    /// Create a pacer allowing `frames_in_flight` concurrent frames.
    ///
    /// # Panics
    ///
    /// Panics if `frames_in_flight` is 0.
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "frames_in_flight must be at least 1");
        Self {
            state: Mutex::new(PacerState {
                available: frames_in_flight,
                in_flight: vec![false; frames_in_flight],
                frame_number: 0,
            }),
            released: Condvar::new(),
            frames_in_flight,
        }
    }

    /// Block until a slot is free, then claim it.
    ///
    /// Slots are handed out round-robin: the returned index is the frame
    /// number modulo the number of frames in flight. If that particular slot
    /// is still in flight, this waits for it even when another slot is free.
    /// There is no timeout.
    pub fn wait_for_slot(&self) -> FrameSlot {
        crate::profile_scope!("wait_for_slot");
        let mut state = self.state.lock();
        while !state.can_acquire() {
            self.released.wait(&mut state);
        }
        let slot = state.acquire();
        log::trace!(
            "FramePacer: acquired slot {} for frame {}",
            slot.index,
            slot.frame_number
        );
        slot
    }

    /// Like [`wait_for_slot`](Self::wait_for_slot), giving up after `timeout`.
    pub fn wait_for_slot_timeout(&self, timeout: Duration) -> Option<FrameSlot> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.can_acquire() {
            if self.released.wait_until(&mut state, deadline).timed_out() {
                if state.can_acquire() {
                    break;
                }
                return None;
            }
        }
        Some(state.acquire())
    }

    /// Hand a slot back.
    ///
    /// Call exactly once per acquired slot, from the completion handler of
    /// the frame's command stream. Releasing a slot that is not in flight
    /// (for example a slot acquired from another pacer) terminates the
    /// process.
    pub fn release_slot(&self, slot: FrameSlot) {
        let mut state = self.state.lock();
        if slot.index >= state.in_flight.len() || !state.in_flight[slot.index] {
            drop(state);
            crate::fatal!(
                "frame pacer: release of slot {} (frame {}) that is not in flight",
                slot.index,
                slot.frame_number
            );
        }
        state.in_flight[slot.index] = false;
        state.available += 1;
        debug_assert!(state.available <= self.frames_in_flight);
        drop(state);

        log::trace!(
            "FramePacer: released slot {} for frame {}",
            slot.index,
            slot.frame_number
        );
        self.released.notify_all();
    }

    /// Block until no slot is in flight.
    pub fn wait_idle(&self) {
        let mut state = self.state.lock();
        while state.available < self.frames_in_flight {
            self.released.wait(&mut state);
        }
    }

    /// Like [`wait_idle`](Self::wait_idle), giving up after `timeout`.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.available < self.frames_in_flight {
            if self.released.wait_until(&mut state, deadline).timed_out() {
                return state.available == self.frames_in_flight;
            }
        }
        true
    }

    /// Maximum number of frames in flight.
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Number of slots currently acquired and not yet released.
    pub fn in_flight(&self) -> usize {
        self.frames_in_flight - self.state.lock().available
    }

    /// Number of slots acquired since creation.
    pub fn frame_count(&self) -> u64 {
        self.state.lock().frame_number
    }

    /// Whether a slot index is currently in flight.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn is_slot_in_flight(&self, index: usize) -> bool {
        assert!(index < self.frames_in_flight, "Invalid slot index");
        self.state.lock().in_flight[index]
    }
}

static_assertions::assert_impl_all!(FramePacer: Send, Sync);
static_assertions::assert_impl_all!(FrameSlot: Send);
static_assertions::assert_not_impl_any!(FrameSlot: Clone, Copy);

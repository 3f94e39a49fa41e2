//! Frame-indexed transient allocators.
//!
//! [`FrameContext`] owns one `(shared, private)` allocator pair per frame in
//! flight and rotates through them. While the GPU still reads frame K from
//! pair `K mod N`, the CPU writes frame K+1 into a different pair, so the two
//! never alias.
//!
//! ```text
//!              pair 0        pair 1        pair 2
//! frame 0   ►  writing
//! frame 1      GPU reads  ►  writing
//! frame 2      GPU reads     GPU reads  ►  writing
//! frame 3   ►  (slot 0 released by the pacer, reset, writing)
//! ```
//!
//! Rotation is driven by the pacer: [`FrameContext::begin_frame`] takes the
//! acquired [`FrameSlot`], so a pair is only reset once the frame that last
//! used it has completed.

use std::sync::Arc;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::pipeline::{FrameEnv, FrameSlot};
use crate::resources::TransientAllocator;
use crate::types::{BufferDescriptor, BufferUsage, BufferVisibility};

/// The allocator pair of one frame slot.
#[derive(Debug)]
pub struct FrameAllocators {
    /// Host-visible arena.
    pub shared: TransientAllocator,
    /// Device-private arena.
    pub private: TransientAllocator,
}

impl FrameAllocators {
    fn reset(&mut self) {
        self.shared.reset();
        self.private.reset();
    }
}

/// Rotating per-frame transient allocators.
#[derive(Debug)]
pub struct FrameContext {
    frames: Vec<FrameAllocators>,
    current: usize,
}

impl FrameContext {
    /// Allocate `frames_in_flight` allocator pairs up front.
    pub fn build(
        device: &Arc<GraphicsDevice>,
        frames_in_flight: usize,
        shared_size: u64,
        private_size: u64,
    ) -> Result<Self, GraphicsError> {
        let env = FrameEnv::default()
            .with_frames_in_flight(frames_in_flight)
            .with_shared_allocator_size(shared_size)
            .with_private_allocator_size(private_size);
        Self::from_env(device, &env)
    }

    /// Allocate the allocator pairs described by `env`.
    pub fn from_env(device: &Arc<GraphicsDevice>, env: &FrameEnv) -> Result<Self, GraphicsError> {
        env.validate()?;

        let arena = |index: usize, visibility: BufferVisibility, size: u64| {
            let descriptor = BufferDescriptor::new(size, BufferUsage::TRANSIENT)
                .with_label(format!("frame{index}_{}", visibility.as_str()))
                .with_visibility(visibility);
            TransientAllocator::with_alignment(device, descriptor, env.default_alignment)
        };

        let frames = (0..env.frames_in_flight)
            .map(|index| {
                Ok(FrameAllocators {
                    shared: arena(index, BufferVisibility::Shared, env.shared_allocator_size)?,
                    private: arena(index, BufferVisibility::Private, env.private_allocator_size)?,
                })
            })
            .collect::<Result<Vec<_>, GraphicsError>>()?;

        log::info!(
            "FrameContext: {} frames in flight, {} B shared + {} B private per frame",
            env.frames_in_flight,
            env.shared_allocator_size,
            env.private_allocator_size
        );

        Ok(Self { frames, current: 0 })
    }

    /// Advance to the next pair and reset it.
    ///
    /// Call exactly once per frame, before any allocation for that frame.
    /// Only safe when the frame that last used the next pair has completed;
    /// prefer [`begin_frame`](Self::begin_frame), which ties rotation to an
    /// acquired pacer slot.
    pub fn next(&mut self) {
        self.current = (self.current + 1) % self.frames.len();
        self.frames[self.current].reset();
        log::trace!("FrameContext: advanced to pair {}", self.current);
    }

    /// Make the pair of an acquired slot current and reset it.
    pub fn begin_frame(&mut self, slot: &FrameSlot) {
        if slot.index() >= self.frames.len() {
            crate::fatal!(
                "frame context: slot {} out of range for {} frames in flight",
                slot.index(),
                self.frames.len()
            );
        }
        self.current = slot.index();
        self.frames[self.current].reset();
        log::trace!(
            "FrameContext: frame {} uses pair {}",
            slot.frame_number(),
            self.current
        );
    }

    /// Index of the current pair.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Number of allocator pairs.
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Host-visible allocator of the frame in progress.
    pub fn current_shared(&self) -> &TransientAllocator {
        &self.frames[self.current].shared
    }

    /// Mutable host-visible allocator of the frame in progress.
    pub fn current_shared_mut(&mut self) -> &mut TransientAllocator {
        &mut self.frames[self.current].shared
    }

    /// Device-private allocator of the frame in progress.
    pub fn current_private(&self) -> &TransientAllocator {
        &self.frames[self.current].private
    }

    /// Mutable device-private allocator of the frame in progress.
    pub fn current_private_mut(&mut self) -> &mut TransientAllocator {
        &mut self.frames[self.current].private
    }

    /// Both allocators of the frame in progress.
    pub fn current_mut(&mut self) -> &mut FrameAllocators {
        &mut self.frames[self.current]
    }

    /// Allocator pair at `index`, for inspection.
    pub fn allocators(&self, index: usize) -> Option<&FrameAllocators> {
        self.frames.get(index)
    }
}

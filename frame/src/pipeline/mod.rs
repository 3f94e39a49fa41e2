//! Per-frame orchestration.
//!
//! [`FramePipeline`] ties the frame core together. Each frame walks the same
//! path:
//!
//! ```text
//! begin_frame()
//!   │  FramePacer::wait_for_slot      blocks while N frames are in flight
//!   │  FrameContext::begin_frame      resets the slot's allocator pair
//!   ▼
//! Frame                               allocate regions, register passes,
//!   │                                 attach counters
//!   ▼
//! Frame::submit()
//!   │  PassGraph::dispatch            topological order into one stream
//!   │  GraphicsDevice::submit
//!   ▼
//! completion thread
//!      CounterSampler::resolve        reports tagged with the frame number
//!      FrameStatsHistory::record
//!      FramePacer::release_slot       the slot's allocators may be reused
//! ```
//!
//! The completion handler is the only place a submitted frame's slot is
//! released, so a slot's allocators are never reset while the GPU may still
//! read from them.
//!
//! # Graceful Shutdown
//!
//! Call [`FramePipeline::wait_idle`] before dropping GPU resources. It
//! returns once every submitted frame has completed and released its slot.
//!
//! # Example
//!
//! ```ignore
//! let device = GraphicsDevice::create(BackendType::Auto)?;
//! let mut pipeline = FramePipeline::new(device, FrameEnv::default())?;
//!
//! for _ in 0..frames {
//!     let mut frame = pipeline.begin_frame();
//!     let vertices = frame.shared().allocate_slice(&mesh);
//!     let timing = frame.sampler().map(|s| s.attach_to_render_pass("scene"));
//!     frame.graph().register_node(scene_pass(vertices, timing), &[]);
//!     frame.submit();
//! }
//!
//! pipeline.wait_idle();
//! ```

mod context;
mod env;
mod pacer;
mod stats;

pub use context::{FrameAllocators, FrameContext};
pub use env::FrameEnv;
pub use pacer::{FramePacer, FrameSlot};
pub use stats::{FrameStats, FrameStatsHistory};

use std::sync::Arc;

use crate::counters::CounterSampler;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::graph::{CompiledGraph, PassGraph};
use crate::resources::TransientAllocator;

/// Drives frames through pacing, allocation, dispatch and completion.
///
/// # Thread Safety
///
/// `FramePipeline` is owned by the frame producer thread. Only the pacer,
/// the counter sampler and the stats history are shared with the
/// completion thread.
#[derive(Debug)]
pub struct FramePipeline {
    device: Arc<GraphicsDevice>,
    env: FrameEnv,
    context: FrameContext,
    pacer: Arc<FramePacer>,
    sampler: Option<CounterSampler>,
    stats: Arc<FrameStatsHistory>,
}

impl FramePipeline {
    /// Build the per-frame allocators, the pacer and the counter sampler.
    ///
    /// The sampler is left out when the device cannot sample timestamps or
    /// when `env.counter_sample_capacity` is zero.
    pub fn new(device: Arc<GraphicsDevice>, env: FrameEnv) -> Result<Self, GraphicsError> {
        env.validate()?;

        let context = FrameContext::from_env(&device, &env)?;
        let sampler = if env.counter_sample_capacity == 0 {
            None
        } else {
            match CounterSampler::build(&device, env.counter_sample_capacity) {
                Ok(sampler) => Some(sampler),
                Err(GraphicsError::FeatureNotSupported(what)) => {
                    log::warn!("FramePipeline: {what} not supported, GPU timing disabled");
                    None
                }
                Err(err) => return Err(err),
            }
        };

        log::info!(
            "FramePipeline: {} frames in flight on {}",
            env.frames_in_flight,
            device.name()
        );

        Ok(Self {
            pacer: Arc::new(FramePacer::new(env.frames_in_flight)),
            stats: Arc::new(FrameStatsHistory::new(env.stats_history)),
            device,
            env,
            context,
            sampler,
        })
    }

    /// Wait for a free slot and start a frame in it.
    ///
    /// Blocks while `frames_in_flight` frames are still executing.
    pub fn begin_frame(&mut self) -> Frame<'_> {
        crate::profile_scope!("begin_frame");

        let slot = self.pacer.wait_for_slot();
        self.context.begin_frame(&slot);

        log::debug!(
            "FramePipeline: begin frame {} (slot {})",
            slot.frame_number(),
            slot.index()
        );

        Frame {
            device: &self.device,
            allocators: self.context.current_mut(),
            sampler: self.sampler.as_ref(),
            pacer: &self.pacer,
            stats: &self.stats,
            graph: PassGraph::new(),
            frame_number: slot.frame_number(),
            slot_index: slot.index(),
            slot: Some(slot),
        }
    }

    /// Block until every submitted frame has completed.
    pub fn wait_idle(&self) {
        log::trace!("FramePipeline: waiting for {} frames", self.pacer.in_flight());
        self.pacer.wait_idle();
        log::trace!("FramePipeline: idle");
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    pub fn env(&self) -> &FrameEnv {
        &self.env
    }

    pub fn context(&self) -> &FrameContext {
        &self.context
    }

    pub fn pacer(&self) -> &Arc<FramePacer> {
        &self.pacer
    }

    /// Counter sampler, absent when GPU timing is unavailable.
    pub fn sampler(&self) -> Option<&CounterSampler> {
        self.sampler.as_ref()
    }

    /// History of completed frames.
    pub fn stats(&self) -> &Arc<FrameStatsHistory> {
        &self.stats
    }
}

/// A frame being built.
///
/// Holds the pacer slot until [`submit`](Self::submit). Dropping a frame
/// without submitting it gives the slot back immediately.
pub struct Frame<'a> {
    device: &'a Arc<GraphicsDevice>,
    allocators: &'a mut FrameAllocators,
    sampler: Option<&'a CounterSampler>,
    pacer: &'a Arc<FramePacer>,
    stats: &'a Arc<FrameStatsHistory>,
    graph: PassGraph,
    frame_number: u64,
    slot_index: usize,
    slot: Option<FrameSlot>,
}

impl Frame<'_> {
    /// Monotonic frame number, also the frame id of counter reports.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Pacer slot index of this frame.
    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    /// Host-visible transient allocator.
    pub fn shared(&mut self) -> &mut TransientAllocator {
        &mut self.allocators.shared
    }

    /// Device-private transient allocator.
    pub fn private(&mut self) -> &mut TransientAllocator {
        &mut self.allocators.private
    }

    /// Both allocators, for passes that need the two at once.
    pub fn allocators(&mut self) -> &mut FrameAllocators {
        self.allocators
    }

    /// Graph of the passes this frame dispatches.
    pub fn graph(&mut self) -> &mut PassGraph {
        &mut self.graph
    }

    pub fn sampler(&self) -> Option<&CounterSampler> {
        self.sampler
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        self.device
    }

    /// Dispatch the graph and submit it to the GPU.
    ///
    /// The completion handler resolves the counter sampler for this frame,
    /// records its [`FrameStats`] and releases the pacer slot.
    pub fn submit(mut self) -> CompiledGraph {
        crate::profile_scope!("submit_frame");

        let frame_number = self.frame_number;
        let slot = self.slot.take();
        let graph = std::mem::take(&mut self.graph);

        let mut stream = self
            .device
            .create_command_stream(format!("frame{frame_number}"));
        let compiled = graph.dispatch(&mut stream);

        let pacer = Arc::clone(self.pacer);
        let stats = Arc::clone(self.stats);
        let sampler = self.sampler.cloned();
        let slot_index = self.slot_index;

        self.device.submit(
            stream,
            Box::new(move |completed| {
                if let Some(sampler) = &sampler {
                    sampler.resolve(frame_number);
                }
                stats.record(FrameStats {
                    frame_number,
                    slot: slot_index,
                    gpu_time_ms: completed.gpu_time_ms,
                    pass_count: completed.pass_count,
                });
                crate::profile_plot!("gpu_time_ms", completed.gpu_time_ms);
                log::debug!(
                    "FramePipeline: frame {frame_number} completed in {:.3} ms",
                    completed.gpu_time_ms
                );
                if let Some(slot) = slot {
                    pacer.release_slot(slot);
                }
            }),
        );

        crate::frame_mark!();
        compiled
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            log::warn!(
                "FramePipeline: frame {} dropped without submit, releasing slot {}",
                slot.frame_number(),
                slot.index()
            );
            self.pacer.release_slot(slot);
        }
    }
}

impl std::fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("frame_number", &self.frame_number)
            .field("slot_index", &self.slot_index)
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BlitPass, ComputePass, RenderPass};

    fn small_env() -> FrameEnv {
        FrameEnv::default()
            .with_frames_in_flight(2)
            .with_shared_allocator_size(4096)
            .with_private_allocator_size(4096)
            .with_counter_sample_capacity(16)
            .with_stats_history(4)
    }

    #[test]
    fn test_frame_numbers_and_slots() {
        let mut pipeline = FramePipeline::new(GraphicsDevice::dummy(), small_env()).unwrap();

        for expected in 0..5u64 {
            let frame = pipeline.begin_frame();
            assert_eq!(frame.frame_number(), expected);
            assert_eq!(frame.slot_index(), (expected % 2) as usize);
            frame.submit();
        }
        pipeline.wait_idle();

        assert_eq!(pipeline.pacer().in_flight(), 0);
        assert_eq!(pipeline.stats().len(), 4);
        assert_eq!(pipeline.stats().latest().map(|s| s.frame_number), Some(4));
    }

    #[test]
    fn test_submit_dispatches_graph_and_resolves_counters() {
        let mut pipeline = FramePipeline::new(GraphicsDevice::dummy(), small_env()).unwrap();

        let mut frame = pipeline.begin_frame();
        let sampler = frame.sampler().cloned().unwrap();
        let src = frame.shared().allocate_slice(&[1u32, 2, 3, 4]);
        let dst = frame.private().allocate(16);

        let upload = frame.graph().register_node(
            BlitPass::new("upload", move |stream| stream.copy_region(&src, &dst))
                .with_timestamps(sampler.attach_to_blit_pass("upload")),
            &[],
        );
        let cull = frame.graph().register_node(
            ComputePass::new("cull", |_| {}).with_timestamps(sampler.attach_to_compute_pass("cull")),
            &[upload],
        );
        frame.graph().register_node(
            RenderPass::new("scene", |_| {}).with_timestamps(sampler.attach_to_render_pass("scene")),
            &[cull],
        );

        let compiled = frame.submit();
        assert_eq!(compiled.len(), 3);
        pipeline.wait_idle();

        let reports = sampler.reports().for_frame(0);
        assert_eq!(reports.len(), 4);
        assert!(reports.iter().all(|r| !r.is_miss()));
        let stats = pipeline.stats().latest().unwrap();
        assert_eq!(stats.pass_count, 3);
        assert!(stats.gpu_time_ms > 0.0);
    }

    #[test]
    fn test_dropped_frame_releases_slot() {
        let mut pipeline = FramePipeline::new(GraphicsDevice::dummy(), small_env()).unwrap();

        {
            let mut frame = pipeline.begin_frame();
            frame.shared().allocate(64);
        }
        assert_eq!(pipeline.pacer().in_flight(), 0);
        assert!(pipeline.stats().is_empty());

        let frame = pipeline.begin_frame();
        assert_eq!(frame.frame_number(), 1);
        drop(frame);
    }

    #[test]
    fn test_zero_counter_capacity_disables_sampler() {
        let env = small_env().with_counter_sample_capacity(0);
        let pipeline = FramePipeline::new(GraphicsDevice::dummy(), env).unwrap();
        assert!(pipeline.sampler().is_none());
    }

    #[test]
    fn test_invalid_env_is_rejected() {
        let env = small_env().with_frames_in_flight(0);
        assert!(matches!(
            FramePipeline::new(GraphicsDevice::dummy(), env),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }
}

//! # Lumen Frame
//!
//! Frame-synchronized GPU core: per-frame transient arenas, bounded frames in
//! flight, dependency-ordered pass dispatch and GPU timestamp sampling.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`TransientAllocator`] - Bump arena over one GPU buffer, reset once per frame
//! - [`FrameContext`] - One shared/private arena pair per frame in flight
//! - [`FramePacer`] - Counting semaphore bounding the frames in flight
//! - [`PassGraph`] - Topologically ordered pass dispatch into a command stream
//! - [`CounterSampler`] - GPU timestamp slots resolved into per-frame reports
//! - [`FramePipeline`] - All of the above driven frame by frame
//! - Multiple backend support: wgpu and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use lumen_frame::{BackendType, FrameEnv, FramePipeline, GraphicsDevice, RenderPass};
//!
//! let device = GraphicsDevice::create(BackendType::Auto)?;
//! let mut pipeline = FramePipeline::new(device, FrameEnv::default())?;
//!
//! let mut frame = pipeline.begin_frame();
//! let uniforms = frame.shared().allocate_with(&camera);
//! frame.graph().register_node(RenderPass::new("scene", move |s| { /* ... */ }), &[]);
//! frame.submit();
//!
//! pipeline.wait_idle();
//! ```

pub mod backend;
pub mod command;
pub mod counters;
pub mod device;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod profiling;
pub mod resources;
pub mod types;

// Re-export main types for convenience
pub use backend::{BackendType, DummyBackend, GpuBackend, create_backend, has_gpu_backend};
pub use command::{
    CommandStream, CompletedStream, CompletionHandler, PassDescriptor, PassKind, TimestampWrites,
};
pub use counters::{
    CounterReportKind, CounterReportStore, CounterSampleReport, CounterSampleSummary,
    CounterSampler,
};
pub use device::GraphicsDevice;
pub use error::GraphicsError;
pub use graph::{BlitPass, CompiledGraph, ComputePass, GraphError, NodeId, Pass, PassGraph, RenderPass};
pub use pipeline::{
    Frame, FrameAllocators, FrameContext, FrameEnv, FramePacer, FramePipeline, FrameSlot,
    FrameStats, FrameStatsHistory,
};
pub use resources::{
    AllocationError, Buffer, BufferBinding, CounterBuffer, Region, TransientAllocator,
};
pub use types::{
    BufferDescriptor, BufferUsage, BufferVisibility, CounterBufferDescriptor,
    CounterSamplingPoints,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version and the available backends.
///
/// Optional; nothing in the crate depends on it having been called.
pub fn init() {
    log::info!(
        "Lumen Frame v{} initialized (GPU backend available: {})",
        VERSION,
        has_gpu_backend()
    );
}

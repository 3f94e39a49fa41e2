//! GPU backend abstraction layer.
//!
//! The frame core talks to the GPU only through the [`GpuBackend`] trait,
//! which covers exactly what transient arenas, pass dispatch and counter
//! sampling consume: buffer creation and host writes, timestamp counter
//! buffers, command stream submission with a completion callback, and bulk
//! counter readback.
//!
//! # Available Backends
//!
//! - `dummy` (default): host-memory backend with an in-order queue thread,
//!   used for tests and headless runs
//! - `wgpu-backend`: cross-platform backend using wgpu timestamp queries
//!
//! # Completion Model
//!
//! [`GpuBackend::submit`] never runs the completion handler on the calling
//! thread. Each backend owns a completion thread that observes GPU progress
//! and invokes handlers in submission order.

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub mod dummy;

use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::{CommandStream, CompletionHandler};
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, CounterBufferDescriptor, CounterSamplingPoints};

pub use dummy::DummyBackend;

/// Handle to a GPU buffer resource.
#[derive(Clone)]
pub enum GpuBuffer {
    /// Dummy backend buffer, stored in host memory.
    Dummy(Arc<Mutex<Vec<u8>>>),
    /// wgpu backend buffer.
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::Buffer>),
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(memory) => f
                .debug_struct("GpuBuffer::Dummy")
                .field("len", &memory.lock().len())
                .finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(buffer) => f.debug_tuple("GpuBuffer::Wgpu").field(buffer).finish(),
        }
    }
}

/// Handle to a buffer of 64-bit GPU timestamps.
#[derive(Clone)]
pub enum GpuCounterBuffer {
    /// Dummy backend counters, stored in host memory.
    Dummy(Arc<Mutex<Vec<u64>>>),
    /// wgpu timestamp query set plus its resolve and readback buffers.
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        query_set: Arc<wgpu::QuerySet>,
        resolve: Arc<wgpu::Buffer>,
        readback: Arc<wgpu::Buffer>,
    },
}

impl std::fmt::Debug for GpuCounterBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(samples) => f
                .debug_struct("GpuCounterBuffer::Dummy")
                .field("slots", &samples.lock().len())
                .finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu { query_set, .. } => f
                .debug_struct("GpuCounterBuffer::Wgpu")
                .field("query_set", query_set)
                .finish_non_exhaustive(),
        }
    }
}

/// GPU backend trait for abstracting different GPU APIs.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Create a buffer resource.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError>;

    /// Write host data into a buffer.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]);

    /// Read data back from a buffer.
    ///
    /// This is a blocking operation that waits for the GPU to finish.
    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Vec<u8>;

    /// Command boundaries at which this device can sample timestamps.
    fn counter_sampling_support(&self) -> CounterSamplingPoints;

    /// Nanoseconds per timestamp tick.
    fn timestamp_period_ns(&self) -> f64;

    /// Create a timestamp counter buffer.
    ///
    /// Fails with [`GraphicsError::FeatureNotSupported`] when the device
    /// cannot sample timestamps at all.
    fn create_counter_buffer(
        &self,
        descriptor: &CounterBufferDescriptor,
    ) -> Result<GpuCounterBuffer, GraphicsError>;

    /// Read back raw timestamps for `range` in one bulk transfer.
    fn resolve_counter_range(
        &self,
        buffer: &GpuCounterBuffer,
        range: Range<u32>,
    ) -> Result<Vec<u64>, GraphicsError>;

    /// Submit a finished command stream.
    ///
    /// `on_complete` runs exactly once, on the backend's completion thread,
    /// after the GPU has executed every command in the stream.
    fn submit(&self, stream: CommandStream, on_complete: CompletionHandler);

    /// Block until every submitted stream has completed.
    fn wait_idle(&self);
}

/// Which backend [`create_backend`] should construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Best available GPU backend, falling back to the dummy backend.
    #[default]
    Auto,
    /// wgpu backend. Requires the `wgpu-backend` feature.
    Wgpu,
    /// Host-memory dummy backend.
    Dummy,
}

/// Create a backend of the requested type.
///
/// [`BackendType::Auto`] tries the GPU backend first and falls back to the
/// dummy backend when no adapter is available.
pub fn create_backend(backend: BackendType) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    match backend {
        BackendType::Dummy => {
            log::info!("Using dummy backend");
            Ok(Arc::new(DummyBackend::new()))
        }
        BackendType::Wgpu => create_wgpu_backend(),
        BackendType::Auto => match create_wgpu_backend() {
            Ok(backend) => Ok(backend),
            Err(e) => {
                log::warn!("Failed to create wgpu backend: {e}");
                log::info!("Using dummy backend");
                Ok(Arc::new(DummyBackend::new()))
            }
        },
    }
}

#[cfg(feature = "wgpu-backend")]
fn create_wgpu_backend() -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    let backend = wgpu_backend::WgpuBackend::new()?;
    log::info!("Using wgpu backend");
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "wgpu-backend"))]
fn create_wgpu_backend() -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    Err(GraphicsError::FeatureNotSupported(
        "built without the `wgpu-backend` feature".to_string(),
    ))
}

/// Check if a real GPU backend is compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "wgpu-backend")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_dummy_backend() {
        let backend = create_backend(BackendType::Dummy).unwrap();
        assert_eq!(backend.name(), "Dummy Backend");
    }

    #[test]
    fn test_auto_backend_always_succeeds() {
        let backend = create_backend(BackendType::Auto).unwrap();
        assert!(!backend.name().is_empty());
    }

    #[cfg(not(feature = "wgpu-backend"))]
    #[test]
    fn test_wgpu_backend_requires_feature() {
        let result = create_backend(BackendType::Wgpu);
        assert!(matches!(result, Err(GraphicsError::FeatureNotSupported(_))));
    }
}

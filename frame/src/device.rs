//! Graphics device.
//!
//! The [`GraphicsDevice`] is the GPU context every frame component receives
//! explicitly. It wraps one [`GpuBackend`] and adds validation, logging and
//! resource tracking on top of it.

use std::ops::Range;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::backend::{BackendType, DummyBackend, GpuBackend, create_backend};
use crate::command::{CommandStream, CompletionHandler};
use crate::error::GraphicsError;
use crate::resources::{Buffer, CounterBuffer};
use crate::types::{BufferDescriptor, CounterBufferDescriptor, CounterSamplingPoints};

/// A graphics device for creating GPU resources and submitting work.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync` and is shared as `Arc<GraphicsDevice>`
/// between the frame producer and the backend's completion thread.
///
/// # Example
///
/// ```ignore
/// let device = GraphicsDevice::create(BackendType::Auto)?;
///
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::UNIFORM))?;
/// device.write_buffer(&buffer, 0, bytemuck::bytes_of(&uniforms));
/// ```
pub struct GraphicsDevice {
    backend: Arc<dyn GpuBackend>,
    // Weak references for leak diagnostics
    buffers: RwLock<Vec<Weak<Buffer>>>,
}

impl GraphicsDevice {
    /// Maximum size of a single buffer (1 GiB).
    pub const MAX_BUFFER_SIZE: u64 = 1 << 30;

    /// Wrap an existing backend.
    pub fn new(backend: Arc<dyn GpuBackend>) -> Arc<Self> {
        log::info!("GraphicsDevice: using {}", backend.name());
        Arc::new(Self {
            backend,
            buffers: RwLock::new(Vec::new()),
        })
    }

    /// Create a device on a backend of the requested type.
    pub fn create(backend: BackendType) -> Result<Arc<Self>, GraphicsError> {
        Ok(Self::new(create_backend(backend)?))
    }

    /// Create a device on a fresh dummy backend.
    pub fn dummy() -> Arc<Self> {
        Self::new(Arc::new(DummyBackend::new()))
    }

    /// Get the backend.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    /// Create a GPU buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero, exceeds [`Self::MAX_BUFFER_SIZE`],
    /// or the backend allocation fails.
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<Arc<Buffer>, GraphicsError> {
        if descriptor.size > Self::MAX_BUFFER_SIZE {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer size {} exceeds maximum {}",
                descriptor.size,
                Self::MAX_BUFFER_SIZE
            )));
        }

        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }

        let gpu = self.backend.create_buffer(descriptor)?;
        let buffer = Arc::new(Buffer::new(descriptor.clone(), gpu));

        let mut buffers = self.buffers.write();
        buffers.retain(|weak| weak.strong_count() > 0);
        buffers.push(Arc::downgrade(&buffer));

        log::trace!(
            "GraphicsDevice: created buffer {:?}, size={}, {}",
            descriptor.label,
            descriptor.size,
            descriptor.visibility.as_str()
        );

        Ok(buffer)
    }

    /// Create a timestamp counter buffer.
    pub fn create_counter_buffer(
        &self,
        descriptor: &CounterBufferDescriptor,
    ) -> Result<Arc<CounterBuffer>, GraphicsError> {
        if descriptor.sample_count == 0 {
            return Err(GraphicsError::InvalidParameter(
                "counter buffer needs at least one slot".to_string(),
            ));
        }

        let gpu = self.backend.create_counter_buffer(descriptor)?;

        log::trace!(
            "GraphicsDevice: created counter buffer {:?}, slots={}",
            descriptor.label,
            descriptor.sample_count
        );

        Ok(Arc::new(CounterBuffer::new(descriptor.clone(), gpu)))
    }

    /// Write host data into a buffer.
    pub fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) {
        debug_assert!(offset + data.len() as u64 <= buffer.size());
        self.backend.write_buffer(buffer.gpu_handle(), offset, data);
    }

    /// Read buffer contents back to the host. Blocks until the GPU is done.
    pub fn read_buffer(&self, buffer: &Buffer, offset: u64, size: u64) -> Vec<u8> {
        self.backend.read_buffer(buffer.gpu_handle(), offset, size)
    }

    /// Command boundaries at which this device can sample timestamps.
    pub fn counter_sampling_support(&self) -> CounterSamplingPoints {
        self.backend.counter_sampling_support()
    }

    /// Nanoseconds per timestamp tick.
    pub fn timestamp_period_ns(&self) -> f64 {
        self.backend.timestamp_period_ns()
    }

    /// Read back raw timestamps for `range` in one transfer.
    pub fn resolve_counters(
        &self,
        buffer: &CounterBuffer,
        range: Range<u32>,
    ) -> Result<Vec<u64>, GraphicsError> {
        if range.end > buffer.sample_count() {
            return Err(GraphicsError::InvalidParameter(format!(
                "counter range {range:?} exceeds {} slots",
                buffer.sample_count()
            )));
        }
        self.backend.resolve_counter_range(buffer.gpu_handle(), range)
    }

    /// Create an empty command stream.
    pub fn create_command_stream(&self, label: impl Into<String>) -> CommandStream {
        let stream = CommandStream::new(label);
        log::trace!("GraphicsDevice: created command stream '{}'", stream.label());
        stream
    }

    /// Submit a finished command stream.
    ///
    /// `on_complete` runs once on the backend's completion thread after the
    /// GPU has executed the stream.
    pub fn submit(&self, stream: CommandStream, on_complete: CompletionHandler) {
        if !stream.is_finished() {
            crate::fatal!(
                "command stream '{}' submitted before finish",
                stream.label()
            );
        }
        log::trace!(
            "GraphicsDevice: submitting '{}' ({} commands)",
            stream.label(),
            stream.command_count()
        );
        self.backend.submit(stream, on_complete);
    }

    /// Block until all submitted work has completed.
    pub fn wait_idle(&self) {
        self.backend.wait_idle();
    }

    /// Number of buffers created by this device that are still alive.
    pub fn live_buffer_count(&self) -> usize {
        self.buffers
            .read()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("backend", &self.backend.name())
            .field("live_buffers", &self.live_buffer_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferUsage;

    #[test]
    fn test_buffer_validation() {
        let device = GraphicsDevice::dummy();

        let zero = device.create_buffer(&BufferDescriptor::new(0, BufferUsage::UNIFORM));
        assert!(matches!(zero, Err(GraphicsError::InvalidParameter(_))));

        let huge = device.create_buffer(&BufferDescriptor::new(
            GraphicsDevice::MAX_BUFFER_SIZE + 1,
            BufferUsage::UNIFORM,
        ));
        assert!(matches!(huge, Err(GraphicsError::InvalidParameter(_))));
    }

    #[test]
    fn test_live_buffer_tracking() {
        let device = GraphicsDevice::dummy();
        let a = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM))
            .unwrap();
        let b = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM))
            .unwrap();
        assert_eq!(device.live_buffer_count(), 2);

        drop(a);
        assert_eq!(device.live_buffer_count(), 1);
        drop(b);
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let device = GraphicsDevice::dummy();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(32, BufferUsage::STORAGE))
            .unwrap();
        device.write_buffer(&buffer, 8, &[1, 2, 3]);
        assert_eq!(device.read_buffer(&buffer, 8, 4), vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_counter_range_is_validated() {
        let device = GraphicsDevice::dummy();
        let counters = device
            .create_counter_buffer(&CounterBufferDescriptor::new(8))
            .unwrap();
        assert!(device.resolve_counters(&counters, 0..8).is_ok());
        assert!(matches!(
            device.resolve_counters(&counters, 0..9),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    #[should_panic(expected = "submitted before finish")]
    fn test_submit_unfinished_stream_is_fatal() {
        let device = GraphicsDevice::dummy();
        let stream = device.create_command_stream("open");
        device.submit(stream, Box::new(|_| {}));
    }
}

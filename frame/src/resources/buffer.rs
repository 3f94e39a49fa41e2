//! GPU buffer resource.

use crate::backend::GpuBuffer;
use crate::types::{BufferDescriptor, BufferUsage, BufferVisibility};

/// A GPU buffer resource.
///
/// Buffers are created by [`GraphicsDevice::create_buffer`] and shared as
/// `Arc<Buffer>`. The backend memory is released when the last reference
/// is dropped.
///
/// [`GraphicsDevice::create_buffer`]: crate::GraphicsDevice::create_buffer
pub struct Buffer {
    descriptor: BufferDescriptor,
    gpu: GpuBuffer,
}

impl Buffer {
    pub(crate) fn new(descriptor: BufferDescriptor, gpu: GpuBuffer) -> Self {
        Self { descriptor, gpu }
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Get the buffer usage flags.
    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    /// Get the memory visibility.
    pub fn visibility(&self) -> BufferVisibility {
        self.descriptor.visibility
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    pub(crate) fn gpu_handle(&self) -> &GpuBuffer {
        &self.gpu
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("label", &self.descriptor.label)
            .field("size", &self.descriptor.size)
            .field("visibility", &self.descriptor.visibility)
            .finish()
    }
}

static_assertions::assert_impl_all!(Buffer: Send, Sync);

//! Timestamp counter buffer resource.

use crate::backend::GpuCounterBuffer;
use crate::types::CounterBufferDescriptor;

/// A GPU buffer of 64-bit timestamp slots.
pub struct CounterBuffer {
    descriptor: CounterBufferDescriptor,
    gpu: GpuCounterBuffer,
}

impl CounterBuffer {
    pub(crate) fn new(descriptor: CounterBufferDescriptor, gpu: GpuCounterBuffer) -> Self {
        Self { descriptor, gpu }
    }

    /// Number of timestamp slots.
    pub fn sample_count(&self) -> u32 {
        self.descriptor.sample_count
    }

    /// Get the label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    pub(crate) fn gpu_handle(&self) -> &GpuCounterBuffer {
        &self.gpu
    }
}

impl std::fmt::Debug for CounterBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterBuffer")
            .field("label", &self.descriptor.label)
            .field("sample_count", &self.descriptor.sample_count)
            .finish()
    }
}

static_assertions::assert_impl_all!(CounterBuffer: Send, Sync);

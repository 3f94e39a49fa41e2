//! Non-owning views into transient buffers.

use std::sync::Arc;

use crate::resources::Buffer;

/// A byte range `[begin, end)` of a backing buffer.
///
/// Regions are handed out by [`TransientAllocator`] and stay valid only for
/// the allocator cycle that produced them: once the allocator is reset, the
/// bytes may be reused by a later frame. The cycle is recorded as an epoch
/// and checked again whenever the region is written through its allocator.
///
/// [`TransientAllocator`]: crate::TransientAllocator
#[derive(Clone)]
pub struct Region {
    buffer: Arc<Buffer>,
    begin: u64,
    end: u64,
    epoch: u64,
}

impl Region {
    pub(crate) fn new(buffer: Arc<Buffer>, begin: u64, end: u64, epoch: u64) -> Self {
        debug_assert!(begin <= end && end <= buffer.size());
        Self {
            buffer,
            begin,
            end,
            epoch,
        }
    }

    /// The backing buffer.
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    /// Byte offset of the first byte in the backing buffer.
    pub fn begin(&self) -> u64 {
        self.begin
    }

    /// Byte offset one past the last byte in the backing buffer.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Size of the region in bytes.
    pub fn size(&self) -> u64 {
        self.end - self.begin
    }

    /// Whether the region covers zero bytes.
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Allocator cycle this region belongs to.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether `offset` (relative to the region start) lies inside the region.
    pub fn contains(&self, offset: u64) -> bool {
        offset < self.size()
    }

    /// Number of whole `T` elements that fit in the region.
    pub fn typed_count<T>(&self) -> u64 {
        match std::mem::size_of::<T>() as u64 {
            0 => 0,
            stride => self.size() / stride,
        }
    }

    /// Binding of the backing buffer at `offset` bytes into the region.
    ///
    /// Terminates the process if `offset` lies outside the region.
    pub fn binding(&self, offset: u64) -> BufferBinding {
        if !self.contains(offset) {
            crate::fatal!(
                "region binding offset {offset} out of bounds for region [{}, {}) of buffer {:?}",
                self.begin,
                self.end,
                self.buffer.label()
            );
        }
        BufferBinding {
            buffer: Arc::clone(&self.buffer),
            offset: self.begin + offset,
        }
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("buffer", &self.buffer.label())
            .field("begin", &self.begin)
            .field("end", &self.end)
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// A buffer plus absolute byte offset, ready to bind to a pass.
#[derive(Debug, Clone)]
pub struct BufferBinding {
    /// The bound buffer.
    pub buffer: Arc<Buffer>,
    /// Absolute byte offset into `buffer`.
    pub offset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuBuffer;
    use crate::types::{BufferDescriptor, BufferUsage};
    use parking_lot::Mutex;

    fn test_buffer(size: u64) -> Arc<Buffer> {
        let descriptor = BufferDescriptor::new(size, BufferUsage::TRANSIENT).with_label("test");
        let memory = Arc::new(Mutex::new(vec![0u8; size as usize]));
        Arc::new(Buffer::new(descriptor, GpuBuffer::Dummy(memory)))
    }

    #[test]
    fn test_region_extent() {
        let region = Region::new(test_buffer(256), 32, 96, 0);
        assert_eq!(region.size(), 64);
        assert!(!region.is_empty());
        assert!(region.contains(63));
        assert!(!region.contains(64));
        assert_eq!(region.typed_count::<[f32; 4]>(), 4);
        assert_eq!(region.typed_count::<u8>(), 64);
    }

    #[test]
    fn test_binding_offsets_are_absolute() {
        let region = Region::new(test_buffer(256), 32, 96, 0);
        let binding = region.binding(16);
        assert_eq!(binding.offset, 48);
        assert!(Arc::ptr_eq(&binding.buffer, region.buffer()));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_binding_outside_region_is_fatal() {
        let region = Region::new(test_buffer(256), 32, 96, 0);
        region.binding(64);
    }
}

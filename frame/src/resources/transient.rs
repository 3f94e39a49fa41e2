//! Per-frame transient bump allocator.
//!
//! A transient allocator owns one fixed-size buffer and hands out aligned
//! [`Region`]s by advancing a cursor. Nothing is freed individually; the
//! whole arena is reclaimed in O(1) by [`TransientAllocator::reset`] once the
//! GPU has finished with the frame that used it.
//!
//! ```text
//!  0        16                 48                    capacity
//!  ├─ 10B ─┤pad├──── 20B ─────┤pad├─ ... ─┤ cursor   │
//!  └ region ┘   └─ region ────┘          ▲
//!                                        next allocation rounds up from here
//! ```
//!
//! Arenas are sized for a known per-frame workload, so running out of space
//! is a sizing bug: [`TransientAllocator::allocate`] terminates the process
//! after logging the request. [`TransientAllocator::try_allocate`] is the
//! checked form for callers that size work dynamically.
//!
//! # Example
//!
//! ```ignore
//! let mut arena = TransientAllocator::new(
//!     &device,
//!     64 * 1024,
//!     BufferVisibility::Shared,
//!     "frame0_shared",
//! )?;
//!
//! let camera = arena.allocate_with(&camera_uniforms);
//! let vertices = arena.allocate_slice(&quad_vertices);
//! let binding = camera.binding(0);
//!
//! // Next time this frame slot comes around:
//! arena.reset();
//! ```

use std::sync::Arc;

use bytemuck::Pod;
use thiserror::Error;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::{Buffer, Region};
use crate::types::{BufferDescriptor, BufferUsage, BufferVisibility};

/// Reasons an allocation request cannot be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// The aligned request does not fit in the remaining capacity.
    #[error(
        "transient arena exhausted: requested {requested} bytes (alignment {alignment}) at cursor {cursor}, capacity {capacity}"
    )]
    CapacityExhausted {
        requested: u64,
        alignment: u64,
        cursor: u64,
        capacity: u64,
    },
    /// The alignment is zero or not a power of two.
    #[error("alignment must be a non-zero power of two, got {0}")]
    InvalidAlignment(u64),
}

/// A bump allocator over one GPU buffer.
///
/// # Thread Safety
///
/// `TransientAllocator` is not shared between threads. Each frame slot owns
/// its allocators exclusively, and only the frame producer touches them.
pub struct TransientAllocator {
    device: Arc<GraphicsDevice>,
    buffer: Arc<Buffer>,
    capacity: u64,
    cursor: u64,
    default_alignment: u64,
    epoch: u64,
    allocation_count: u32,
    high_water_mark: u64,
}

impl TransientAllocator {
    /// Default alignment for allocations (16 bytes).
    pub const DEFAULT_ALIGNMENT: u64 = 16;

    /// Create an allocator with its own backing buffer of `capacity` bytes.
    pub fn new(
        device: &Arc<GraphicsDevice>,
        capacity: u64,
        visibility: BufferVisibility,
        label: &str,
    ) -> Result<Self, GraphicsError> {
        let descriptor = BufferDescriptor::new(capacity, BufferUsage::TRANSIENT)
            .with_label(label)
            .with_visibility(visibility);
        Self::with_alignment(device, descriptor, Self::DEFAULT_ALIGNMENT)
    }

    /// Create an allocator from a full buffer descriptor and default alignment.
    pub fn with_alignment(
        device: &Arc<GraphicsDevice>,
        descriptor: BufferDescriptor,
        alignment: u64,
    ) -> Result<Self, GraphicsError> {
        if !alignment.is_power_of_two() {
            return Err(GraphicsError::InvalidParameter(format!(
                "alignment must be a power of 2, got {alignment}"
            )));
        }

        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "transient allocator capacity cannot be zero".to_string(),
            ));
        }

        let buffer = device.create_buffer(&descriptor)?;

        log::debug!(
            "TransientAllocator: created '{}' ({} bytes, {}, alignment {})",
            descriptor.label_or_default(),
            descriptor.size,
            descriptor.visibility.as_str(),
            alignment
        );

        Ok(Self {
            device: Arc::clone(device),
            buffer,
            capacity: descriptor.size,
            cursor: 0,
            default_alignment: alignment,
            epoch: 0,
            allocation_count: 0,
            high_water_mark: 0,
        })
    }

    /// Get the backing buffer.
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    /// Get the memory visibility of the backing buffer.
    pub fn visibility(&self) -> BufferVisibility {
        self.buffer.visibility()
    }

    /// Get the total capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Get the current cursor.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Bytes used since the last reset, including alignment padding.
    pub fn used(&self) -> u64 {
        self.cursor
    }

    /// Bytes left before the arena is exhausted.
    pub fn remaining(&self) -> u64 {
        self.capacity - self.cursor
    }

    /// Default alignment of [`allocate`](Self::allocate).
    pub fn default_alignment(&self) -> u64 {
        self.default_alignment
    }

    /// Number of allocations since the last reset.
    pub fn allocation_count(&self) -> u32 {
        self.allocation_count
    }

    /// Highest cursor value ever reached, across all cycles.
    pub fn high_water_mark(&self) -> u64 {
        self.high_water_mark
    }

    /// Number of resets so far. Regions carry the epoch they were issued in.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Check whether an allocation would fit without exhausting the arena.
    pub fn can_allocate(&self, size: u64, alignment: u64) -> bool {
        self.fit(size, alignment).is_ok()
    }

    /// Allocate `size` bytes with the default alignment.
    ///
    /// Terminates the process if the arena is exhausted.
    pub fn allocate(&mut self, size: u64) -> Region {
        self.allocate_aligned(size, self.default_alignment)
    }

    /// Allocate `size` bytes aligned to `alignment`.
    ///
    /// Terminates the process if the arena is exhausted or the alignment is
    /// not a power of two. The diagnostic names the arena, the request and
    /// the remaining capacity.
    pub fn allocate_aligned(&mut self, size: u64, alignment: u64) -> Region {
        match self.try_allocate(size, alignment) {
            Ok(region) => region,
            Err(err) => crate::fatal!("'{}': {err}", self.label()),
        }
    }

    /// Allocate `size` bytes aligned to `alignment`, reporting failure.
    ///
    /// On failure the cursor is left unchanged.
    pub fn try_allocate(&mut self, size: u64, alignment: u64) -> Result<Region, AllocationError> {
        let begin = self.fit(size, alignment)?;
        let end = begin + size;

        if size > 0 {
            self.cursor = end;
            self.high_water_mark = self.high_water_mark.max(end);
        }
        self.allocation_count += 1;

        log::trace!(
            "TransientAllocator '{}': allocated [{begin}, {end}) (alignment {alignment})",
            self.label()
        );

        Ok(Region::new(Arc::clone(&self.buffer), begin, end, self.epoch))
    }

    /// Allocate room for `count` values of `T`.
    pub fn allocate_typed<T: Pod>(&mut self, count: usize) -> Region {
        let Some(size) = std::mem::size_of::<T>().checked_mul(count) else {
            crate::fatal!(
                "'{}': transient arena exhausted: {count} values of {} overflow the address space",
                self.label(),
                std::any::type_name::<T>()
            );
        };
        self.allocate_aligned(size as u64, self.alignment_for::<T>())
    }

    /// Allocate a region for `value` and write it.
    pub fn allocate_with<T: Pod>(&mut self, value: &T) -> Region {
        let region = self.allocate_typed::<T>(1);
        self.write(&region, value);
        region
    }

    /// Allocate a region for `values` and write them.
    pub fn allocate_slice<T: Pod>(&mut self, values: &[T]) -> Region {
        let region = self.allocate_typed::<T>(values.len());
        self.write_slice(&region, values);
        region
    }

    /// Write a single value to the start of `region`.
    pub fn write<T: Pod>(&self, region: &Region, value: &T) {
        self.write_bytes(region, bytemuck::bytes_of(value));
    }

    /// Write a slice of values to the start of `region`.
    pub fn write_slice<T: Pod>(&self, region: &Region, values: &[T]) {
        self.write_bytes(region, bytemuck::cast_slice(values));
    }

    /// Copy raw bytes into the start of `region`.
    ///
    /// Terminates the process if the payload is larger than the region, the
    /// region was issued before the last reset or by another allocator, or
    /// the arena is not host-writable.
    pub fn write_bytes(&self, region: &Region, data: &[u8]) {
        if !Arc::ptr_eq(region.buffer(), &self.buffer) {
            crate::fatal!(
                "'{}': region of buffer {:?} written through the wrong allocator",
                self.label(),
                region.buffer().label()
            );
        }
        if region.epoch() != self.epoch {
            crate::fatal!(
                "'{}': write through stale region [{}, {}) from epoch {} (current epoch {})",
                self.label(),
                region.begin(),
                region.end(),
                region.epoch(),
                self.epoch
            );
        }
        if !self.visibility().is_host_writable() {
            crate::fatal!(
                "'{}': cannot write {} bytes from the CPU into a {} arena",
                self.label(),
                data.len(),
                self.visibility().as_str()
            );
        }
        if data.len() as u64 > region.size() {
            crate::fatal!(
                "'{}': write overflow, {} bytes into region [{}, {}) of {} bytes",
                self.label(),
                data.len(),
                region.begin(),
                region.end(),
                region.size()
            );
        }
        if data.is_empty() {
            return;
        }

        self.device.write_buffer(&self.buffer, region.begin(), data);
    }

    /// Reclaim the whole arena.
    ///
    /// Memory is not cleared. Regions issued before the reset must not be
    /// used again.
    pub fn reset(&mut self) {
        log::trace!(
            "TransientAllocator '{}': reset after {} allocations ({} bytes)",
            self.label(),
            self.allocation_count,
            self.cursor
        );
        self.cursor = 0;
        self.allocation_count = 0;
        self.epoch += 1;
    }

    fn label(&self) -> &str {
        self.buffer.label().unwrap_or("transient")
    }

    fn alignment_for<T>(&self) -> u64 {
        self.default_alignment.max(std::mem::align_of::<T>() as u64)
    }

    fn fit(&self, size: u64, alignment: u64) -> Result<u64, AllocationError> {
        if !alignment.is_power_of_two() {
            return Err(AllocationError::InvalidAlignment(alignment));
        }

        let exhausted = AllocationError::CapacityExhausted {
            requested: size,
            alignment,
            cursor: self.cursor,
            capacity: self.capacity,
        };

        let begin = align_up(self.cursor, alignment).ok_or(exhausted)?;
        match begin.checked_add(size) {
            Some(end) if end <= self.capacity => Ok(begin),
            _ => Err(exhausted),
        }
    }
}

impl std::fmt::Debug for TransientAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransientAllocator")
            .field("buffer", &self.buffer.label())
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor)
            .field("default_alignment", &self.default_alignment)
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// Align a value up to the given power-of-two alignment.
#[inline]
fn align_up(value: u64, alignment: u64) -> Option<u64> {
    debug_assert!(alignment.is_power_of_two());
    Some(value.checked_add(alignment - 1)? & !(alignment - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn create_test_device() -> Arc<GraphicsDevice> {
        GraphicsDevice::dummy()
    }

    fn shared_arena(capacity: u64) -> TransientAllocator {
        TransientAllocator::new(&create_test_device(), capacity, BufferVisibility::Shared, "test")
            .unwrap()
    }

    #[rstest]
    #[case(0, 16, 0)]
    #[case(1, 16, 16)]
    #[case(10, 16, 16)]
    #[case(16, 16, 16)]
    #[case(17, 256, 256)]
    fn test_align_up(#[case] value: u64, #[case] alignment: u64, #[case] expected: u64) {
        assert_eq!(align_up(value, alignment), Some(expected));
    }

    #[test]
    fn test_align_up_overflow() {
        assert_eq!(align_up(u64::MAX, 16), None);
    }

    #[test]
    fn test_creation() {
        let arena = shared_arena(4096);
        assert_eq!(arena.capacity(), 4096);
        assert_eq!(arena.cursor(), 0);
        assert_eq!(arena.remaining(), 4096);
        assert_eq!(arena.default_alignment(), 16);
        assert_eq!(arena.visibility(), BufferVisibility::Shared);
    }

    #[test]
    fn test_rejects_invalid_construction() {
        let device = create_test_device();
        let descriptor = BufferDescriptor::new(1024, BufferUsage::TRANSIENT);
        assert!(TransientAllocator::with_alignment(&device, descriptor, 24).is_err());
        assert!(
            TransientAllocator::new(&device, 0, BufferVisibility::Shared, "empty").is_err()
        );
    }

    #[test]
    fn test_second_allocation_is_rounded_up() {
        let mut arena = shared_arena(1024);

        let first = arena.allocate(10);
        let second = arena.allocate(20);

        assert_eq!((first.begin(), first.end()), (0, 10));
        assert_eq!((second.begin(), second.end()), (16, 36));
        assert_eq!(arena.cursor(), 36);
        assert_eq!(arena.allocation_count(), 2);
    }

    #[rstest]
    #[case(&[10, 20, 30, 40], 16)]
    #[case(&[1, 1, 1, 1, 1], 64)]
    #[case(&[100, 3, 250], 256)]
    fn test_regions_are_aligned_and_in_bounds(#[case] sizes: &[u64], #[case] alignment: u64) {
        let mut arena = shared_arena(2048);
        let mut previous_end = 0;
        for &size in sizes {
            let region = arena.allocate_aligned(size, alignment);
            assert_eq!(region.begin() % alignment, 0);
            assert!(region.begin() >= previous_end);
            assert!(region.end() <= arena.capacity());
            assert_eq!(region.size(), size);
            previous_end = region.end();
        }
    }

    #[test]
    fn test_exhaustion_leaves_cursor_unchanged() {
        let mut arena = shared_arena(512);
        arena.allocate_aligned(400, 64);

        let err = arena.try_allocate(200, 64).unwrap_err();
        assert_eq!(
            err,
            AllocationError::CapacityExhausted {
                requested: 200,
                alignment: 64,
                cursor: 400,
                capacity: 512,
            }
        );
        assert_eq!(arena.cursor(), 400);

        // 448 + 64 == capacity still fits
        let region = arena.try_allocate(64, 64).unwrap();
        assert_eq!(region.begin(), 448);
        assert!(!arena.can_allocate(1, 1));
    }

    #[test]
    #[should_panic(expected = "transient arena exhausted: requested 600 bytes")]
    fn test_allocate_past_capacity_is_fatal() {
        let mut arena = shared_arena(512);
        arena.allocate(600);
    }

    #[test]
    #[should_panic(expected = "values of u64 overflow the address space")]
    fn test_typed_allocation_overflow_is_fatal() {
        let mut arena = shared_arena(512);
        arena.allocate_typed::<u64>(usize::MAX / 2);
    }

    #[test]
    fn test_fatal_allocation_does_not_move_cursor() {
        let mut arena = shared_arena(128);
        arena.allocate(100);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            arena.allocate(100);
        }));

        assert!(result.is_err());
        assert_eq!(arena.cursor(), 100);
    }

    #[test]
    fn test_invalid_alignment_is_reported() {
        let mut arena = shared_arena(128);
        assert_eq!(
            arena.try_allocate(8, 12).unwrap_err(),
            AllocationError::InvalidAlignment(12)
        );
        assert_eq!(
            arena.try_allocate(8, 0).unwrap_err(),
            AllocationError::InvalidAlignment(0)
        );
    }

    #[test]
    fn test_zero_size_allocation_does_not_advance() {
        let mut arena = shared_arena(128);
        arena.allocate(10);
        let empty = arena.allocate(0);
        assert!(empty.is_empty());
        assert_eq!(empty.begin(), 16);
        assert_eq!(arena.cursor(), 10);
    }

    #[test]
    fn test_reset_restarts_at_zero() {
        let mut arena = shared_arena(1024);
        arena.allocate(300);
        arena.allocate(200);
        let epoch = arena.epoch();

        arena.reset();

        assert_eq!(arena.cursor(), 0);
        assert_eq!(arena.allocation_count(), 0);
        assert_eq!(arena.epoch(), epoch + 1);
        assert_eq!(arena.high_water_mark(), 504);

        let region = arena.allocate(64);
        assert_eq!(region.begin(), 0);
    }

    #[test]
    fn test_typed_allocation() {
        let mut arena = shared_arena(1024);
        arena.allocate(1);
        let region = arena.allocate_typed::<[f32; 4]>(3);
        assert_eq!(region.begin(), 16);
        assert_eq!(region.size(), 48);
        assert_eq!(region.typed_count::<[f32; 4]>(), 3);
    }

    #[test]
    fn test_write_lands_in_backing_buffer() {
        let device = create_test_device();
        let mut arena =
            TransientAllocator::new(&device, 256, BufferVisibility::Shared, "upload").unwrap();

        arena.allocate(4);
        let region = arena.allocate_slice(&[1u32, 2, 3, 4]);

        let bytes = device.read_buffer(arena.buffer(), region.begin(), region.size());
        let values: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        assert_eq!(values, [1, 2, 3, 4]);
    }

    #[test]
    fn test_allocate_with_single_value() {
        let device = create_test_device();
        let mut arena =
            TransientAllocator::new(&device, 256, BufferVisibility::Shared, "uniforms").unwrap();

        let region = arena.allocate_with(&[0.5f32, 1.0, 2.0, 4.0]);
        let bytes = device.read_buffer(arena.buffer(), region.begin(), 16);
        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        assert_eq!(values, [0.5, 1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_partial_write_is_allowed() {
        let mut arena = shared_arena(256);
        let region = arena.allocate(64);
        arena.write(&region, &7u32);
        arena.write_slice::<u32>(&region, &[]);
    }

    #[test]
    #[should_panic(expected = "write overflow, 32 bytes into region [0, 16)")]
    fn test_write_overflow_is_fatal() {
        let mut arena = shared_arena(256);
        let region = arena.allocate(16);
        arena.write_slice(&region, &[0u64; 4]);
    }

    #[test]
    #[should_panic(expected = "stale region")]
    fn test_write_after_reset_is_fatal() {
        let mut arena = shared_arena(256);
        let region = arena.allocate(16);
        arena.reset();
        arena.write(&region, &1u32);
    }

    #[test]
    #[should_panic(expected = "cannot write 4 bytes from the CPU into a private arena")]
    fn test_cpu_write_to_private_arena_is_fatal() {
        let device = create_test_device();
        let mut arena =
            TransientAllocator::new(&device, 256, BufferVisibility::Private, "gpu_only").unwrap();
        let region = arena.allocate(16);
        arena.write(&region, &1u32);
    }

    #[test]
    #[should_panic(expected = "written through the wrong allocator")]
    fn test_region_from_other_allocator_is_fatal() {
        let mut first = shared_arena(256);
        let second = shared_arena(256);
        let region = first.allocate(16);
        second.write(&region, &1u32);
    }
}

//! Frame core configuration.

use crate::error::GraphicsError;
use crate::resources::TransientAllocator;

/// One mebibyte.
const MIB: u64 = 1024 * 1024;

/// Tunables of the frame core.
///
/// # Example
///
/// ```ignore
/// let env = FrameEnv::default()
///     .with_frames_in_flight(2)
///     .with_shared_allocator_size(4 * 1024 * 1024);
/// env.validate()?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEnv {
    /// Number of frames that may be in flight at once.
    pub frames_in_flight: usize,
    /// Capacity of each host-visible transient arena, in bytes.
    pub shared_allocator_size: u64,
    /// Capacity of each device-private transient arena, in bytes.
    pub private_allocator_size: u64,
    /// Number of timestamp slots in the counter buffer.
    pub counter_sample_capacity: u32,
    /// Default alignment of transient allocations.
    pub default_alignment: u64,
    /// Number of frames kept in the statistics history.
    pub stats_history: usize,
}

impl Default for FrameEnv {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            shared_allocator_size: 10 * MIB,
            private_allocator_size: 10 * MIB,
            counter_sample_capacity: 32,
            default_alignment: TransientAllocator::DEFAULT_ALIGNMENT,
            stats_history: 120,
        }
    }
}

impl FrameEnv {
    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight;
        self
    }

    /// Set the capacity of each shared arena.
    pub fn with_shared_allocator_size(mut self, size: u64) -> Self {
        self.shared_allocator_size = size;
        self
    }

    /// Set the capacity of each private arena.
    pub fn with_private_allocator_size(mut self, size: u64) -> Self {
        self.private_allocator_size = size;
        self
    }

    /// Set the number of timestamp counter slots.
    pub fn with_counter_sample_capacity(mut self, capacity: u32) -> Self {
        self.counter_sample_capacity = capacity;
        self
    }

    /// Set the default transient allocation alignment.
    pub fn with_default_alignment(mut self, alignment: u64) -> Self {
        self.default_alignment = alignment;
        self
    }

    /// Set the statistics history length.
    pub fn with_stats_history(mut self, frames: usize) -> Self {
        self.stats_history = frames;
        self
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<(), GraphicsError> {
        let invalid = |msg: &str| Err(GraphicsError::InvalidParameter(msg.to_string()));

        if self.frames_in_flight == 0 {
            return invalid("frames_in_flight must be at least 1");
        }
        if self.shared_allocator_size == 0 || self.private_allocator_size == 0 {
            return invalid("transient allocator sizes must be non-zero");
        }
        if !self.default_alignment.is_power_of_two() {
            return Err(GraphicsError::InvalidParameter(format!(
                "default_alignment must be a power of 2, got {}",
                self.default_alignment
            )));
        }
        if self.stats_history == 0 {
            return invalid("stats_history must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let env = FrameEnv::default();
        assert_eq!(env.frames_in_flight, 3);
        assert_eq!(env.shared_allocator_size, 10 * MIB);
        assert_eq!(env.private_allocator_size, 10 * MIB);
        assert_eq!(env.counter_sample_capacity, 32);
        assert_eq!(env.default_alignment, 16);
        assert!(env.validate().is_ok());
    }

    #[rstest]
    #[case(FrameEnv::default().with_frames_in_flight(0))]
    #[case(FrameEnv::default().with_shared_allocator_size(0))]
    #[case(FrameEnv::default().with_private_allocator_size(0))]
    #[case(FrameEnv::default().with_default_alignment(12))]
    #[case(FrameEnv::default().with_stats_history(0))]
    fn test_invalid_env(#[case] env: FrameEnv) {
        assert!(matches!(
            env.validate(),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_zero_counter_capacity_is_valid() {
        // Disables counter sampling rather than being an error.
        let env = FrameEnv::default().with_counter_sample_capacity(0);
        assert!(env.validate().is_ok());
    }
}

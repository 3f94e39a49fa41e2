//! GPU counter buffer types.

use bitflags::bitflags;

bitflags! {
    /// Command boundaries at which a device can sample timestamps.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CounterSamplingPoints: u32 {
        /// At the start and end of a pass (stage boundary).
        const STAGE = 1 << 0;
        /// Between individual draw calls.
        const DRAW = 1 << 1;
        /// Between blit commands.
        const BLIT = 1 << 2;
        /// Between compute dispatches.
        const DISPATCH = 1 << 3;
        /// Between tile dispatches.
        const TILE_DISPATCH = 1 << 4;
    }
}

impl Default for CounterSamplingPoints {
    fn default() -> Self {
        Self::empty()
    }
}

impl CounterSamplingPoints {
    /// Human readable names of the supported boundaries.
    pub fn names(self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }
}

/// Descriptor for a buffer of 64-bit timestamp samples.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterBufferDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Number of timestamp slots.
    pub sample_count: u32,
}

impl CounterBufferDescriptor {
    /// Create a descriptor with `sample_count` slots.
    pub fn new(sample_count: u32) -> Self {
        Self {
            label: None,
            sample_count,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_point_names() {
        let points = CounterSamplingPoints::STAGE | CounterSamplingPoints::DISPATCH;
        assert_eq!(points.names(), vec!["STAGE", "DISPATCH"]);
        assert!(CounterSamplingPoints::default().names().is_empty());
    }
}

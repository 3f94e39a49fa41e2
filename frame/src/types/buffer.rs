//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 3;
        /// Buffer can be used as an indirect argument buffer.
        const INDIRECT = 1 << 4;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 5;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 6;
        /// Buffer is mappable for CPU reads.
        const MAP_READ = 1 << 7;

        /// Usage of per-frame transient arenas.
        const TRANSIENT = Self::VERTEX.bits()
            | Self::INDEX.bits()
            | Self::UNIFORM.bits()
            | Self::STORAGE.bits()
            | Self::INDIRECT.bits()
            | Self::COPY_SRC.bits()
            | Self::COPY_DST.bits();
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Where a buffer's memory lives, as seen from the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferVisibility {
    /// Host-visible memory the CPU may write through.
    #[default]
    Shared,
    /// Device-local memory, written only by GPU commands.
    Private,
}

impl BufferVisibility {
    /// Whether the CPU may write into buffers of this visibility.
    pub fn is_host_writable(self) -> bool {
        matches!(self, Self::Shared)
    }

    /// Short name used in labels and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Private => "private",
        }
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Memory visibility.
    pub visibility: BufferVisibility,
}

impl BufferDescriptor {
    /// Create a new host-visible buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            visibility: BufferVisibility::Shared,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the memory visibility.
    pub fn with_visibility(mut self, visibility: BufferVisibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// The label, or `"unnamed"` when none was set.
    pub fn label_or_default(&self) -> &str {
        self.label.as_deref().unwrap_or("unnamed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let desc = BufferDescriptor::new(1024, BufferUsage::TRANSIENT)
            .with_label("frame0_private")
            .with_visibility(BufferVisibility::Private);

        assert_eq!(desc.size, 1024);
        assert_eq!(desc.label_or_default(), "frame0_private");
        assert!(!desc.visibility.is_host_writable());
        assert!(desc.usage.contains(BufferUsage::COPY_DST));
        assert!(!desc.usage.contains(BufferUsage::MAP_READ));
    }

    #[test]
    fn test_default_visibility_is_shared() {
        let desc = BufferDescriptor::new(16, BufferUsage::UNIFORM);
        assert_eq!(desc.visibility, BufferVisibility::Shared);
        assert_eq!(desc.label_or_default(), "unnamed");
    }
}

//! Buffer types and descriptors.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

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
        /// Buffer can be copied to or filled.
        const COPY_DST = 1 << 6;
        /// Buffer has a CPU-visible staging copy written by CPU tasks.
        const HOST_WRITE = 1 << 7;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
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
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// Descriptor for a uniform buffer written from the CPU every update.
    pub fn uniform(size: u64) -> Self {
        Self::new(size, BufferUsage::UNIFORM | BufferUsage::HOST_WRITE)
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

// ============================================================================
// Indirect Drawing Arguments
// ============================================================================

/// Arguments for a non-indexed indirect draw, as laid out in an indirect buffer.
///
/// Mesh producers write this from a compute dispatch so the draw that
/// consumes the generated vertices never needs a CPU readback.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct DrawIndirectArgs {
    /// Number of vertices to draw.
    pub vertex_count: u32,
    /// Number of instances to draw.
    pub instance_count: u32,
    /// Index of the first vertex to draw.
    pub first_vertex: u32,
    /// Instance ID of the first instance to draw.
    pub first_instance: u32,
}

impl DrawIndirectArgs {
    /// Size of the struct in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Create new indirect draw arguments.
    pub fn new(vertex_count: u32, instance_count: u32) -> Self {
        Self {
            vertex_count,
            instance_count,
            first_vertex: 0,
            first_instance: 0,
        }
    }
}

/// Arguments for an indexed indirect draw.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct DrawIndexedIndirectArgs {
    /// Number of indices to draw.
    pub index_count: u32,
    /// Number of instances to draw.
    pub instance_count: u32,
    /// Index of the first index to draw.
    pub first_index: u32,
    /// Value added to each index before reading from the vertex buffer.
    pub base_vertex: i32,
    /// Instance ID of the first instance to draw.
    pub first_instance: u32,
}

impl DrawIndexedIndirectArgs {
    /// Size of the struct in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indirect_args_layout() {
        assert_eq!(DrawIndirectArgs::SIZE, 16);
        assert_eq!(DrawIndexedIndirectArgs::SIZE, 20);

        let args = DrawIndirectArgs::new(36, 2);
        let bytes = bytemuck::bytes_of(&args);
        assert_eq!(&bytes[0..4], &36u32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &2u32.to_ne_bytes());
    }

    #[test]
    fn test_uniform_descriptor() {
        let desc = BufferDescriptor::uniform(64).with_label("params");
        assert!(desc.usage.contains(BufferUsage::UNIFORM | BufferUsage::HOST_WRITE));
        assert_eq!(desc.label.as_deref(), Some("params"));
    }
}

//! Resource handles and the allocator seam.
//!
//! Present tasks never own resources. They name them through the `Copy`
//! handles defined here, while the allocator that created a resource (a
//! backend implementing [`ResourceAllocator`]) keeps ownership of its
//! storage.

mod handle;
mod program;
mod registry;

pub use handle::{BufferId, FramebufferId, ProgramId, TextureId, TextureViewId};
pub use program::{
    BindingDecl, BindingKind, BindingSlot, ProgramDescriptor, ProgramKind, ProgramLayout,
};
pub use registry::{FramebufferDescriptor, ResourceRegistry, TextureViewDescriptor};

use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, TextureDescriptor};

/// Creates resources and exposes their descriptors.
///
/// Producers allocate their buffers, textures and framebuffers through this
/// trait so they stay independent of the backend that stores them.
pub trait ResourceAllocator {
    /// Read-only access to the descriptors of every live resource.
    fn registry(&self) -> &ResourceRegistry;

    /// Allocate a buffer.
    fn create_buffer(&mut self, descriptor: &BufferDescriptor) -> Result<BufferId, GraphicsError>;

    /// Allocate a texture.
    fn create_texture(&mut self, descriptor: &TextureDescriptor)
        -> Result<TextureId, GraphicsError>;

    /// Create a view of one mip level of a texture.
    fn create_texture_view(
        &mut self,
        texture: TextureId,
        mip_level: u32,
    ) -> Result<TextureViewId, GraphicsError>;

    /// Create a framebuffer from attachment views.
    fn create_framebuffer(
        &mut self,
        descriptor: &FramebufferDescriptor,
    ) -> Result<FramebufferId, GraphicsError>;

    /// Free a buffer. Returns false if the handle was already stale.
    fn destroy_buffer(&mut self, buffer: BufferId) -> bool;

    /// Free a texture. Views of it stop resolving.
    fn destroy_texture(&mut self, texture: TextureId) -> bool;

    /// Free a texture view.
    fn destroy_texture_view(&mut self, view: TextureViewId) -> bool;

    /// Free a framebuffer. Its attachment views stay live.
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) -> bool;
}

impl ResourceAllocator for ResourceRegistry {
    fn registry(&self) -> &ResourceRegistry {
        self
    }

    fn create_buffer(&mut self, descriptor: &BufferDescriptor) -> Result<BufferId, GraphicsError> {
        ResourceRegistry::create_buffer(self, descriptor)
    }

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureId, GraphicsError> {
        ResourceRegistry::create_texture(self, descriptor)
    }

    fn create_texture_view(
        &mut self,
        texture: TextureId,
        mip_level: u32,
    ) -> Result<TextureViewId, GraphicsError> {
        ResourceRegistry::create_texture_view(self, texture, mip_level)
    }

    fn create_framebuffer(
        &mut self,
        descriptor: &FramebufferDescriptor,
    ) -> Result<FramebufferId, GraphicsError> {
        ResourceRegistry::create_framebuffer(self, descriptor)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) -> bool {
        ResourceRegistry::destroy_buffer(self, buffer)
    }

    fn destroy_texture(&mut self, texture: TextureId) -> bool {
        ResourceRegistry::destroy_texture(self, texture)
    }

    fn destroy_texture_view(&mut self, view: TextureViewId) -> bool {
        ResourceRegistry::destroy_texture_view(self, view)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) -> bool {
        ResourceRegistry::destroy_framebuffer(self, framebuffer)
    }
}

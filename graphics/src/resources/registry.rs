//! Descriptor registry for every resource the present-task graph can name.

use thistle_core::arena::Arena;

use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, TextureDescriptor};

use super::handle::{BufferId, FramebufferId, ProgramId, TextureId, TextureViewId};
use super::program::ProgramDescriptor;

/// A view of a single mip level of a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureViewDescriptor {
    /// Viewed texture.
    pub texture: TextureId,
    /// Viewed mip level.
    pub mip_level: u32,
}

/// A set of attachment views rendered into together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FramebufferDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Color attachments, in attachment order.
    pub color_attachments: Vec<TextureViewId>,
    /// Optional depth attachment; counted after the color attachments.
    pub depth_attachment: Option<TextureViewId>,
}

impl FramebufferDescriptor {
    /// Create an empty framebuffer descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a color attachment.
    pub fn with_color(mut self, view: TextureViewId) -> Self {
        self.color_attachments.push(view);
        self
    }

    /// Set the depth attachment.
    pub fn with_depth(mut self, view: TextureViewId) -> Self {
        self.depth_attachment = Some(view);
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Number of attachments, depth included.
    pub fn attachment_count(&self) -> usize {
        self.color_attachments.len() + usize::from(self.depth_attachment.is_some())
    }

    /// Attachments in load-policy order: colors first, then depth.
    pub fn attachments(&self) -> impl Iterator<Item = TextureViewId> + '_ {
        self.color_attachments
            .iter()
            .copied()
            .chain(self.depth_attachment)
    }
}

/// Generational storage of resource descriptors.
///
/// The registry only describes resources; storage lives with whichever
/// backend allocated them. Handles are `Copy` and compare by identity.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    buffers: Arena<BufferDescriptor>,
    textures: Arena<TextureDescriptor>,
    views: Arena<TextureViewDescriptor>,
    framebuffers: Arena<FramebufferDescriptor>,
    programs: Arena<ProgramDescriptor>,
}

impl ResourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a buffer.
    pub fn create_buffer(&mut self, descriptor: &BufferDescriptor) -> Result<BufferId, GraphicsError> {
        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer {:?} has zero size",
                descriptor.label
            )));
        }
        Ok(BufferId(self.buffers.insert(descriptor.clone())))
    }

    /// Register a texture.
    pub fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureId, GraphicsError> {
        let size = descriptor.size;
        if size.width == 0 || size.height == 0 || size.depth == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture {:?} has an empty extent",
                descriptor.label
            )));
        }
        if descriptor.mip_level_count == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture {:?} has no mip levels",
                descriptor.label
            )));
        }
        let max_levels = descriptor.max_mip_levels();
        if descriptor.mip_level_count > max_levels {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture {:?} asks for {} mip levels, its size allows {max_levels}",
                descriptor.label, descriptor.mip_level_count
            )));
        }
        Ok(TextureId(self.textures.insert(descriptor.clone())))
    }

    /// Register a view of one mip level of `texture`.
    pub fn create_texture_view(
        &mut self,
        texture: TextureId,
        mip_level: u32,
    ) -> Result<TextureViewId, GraphicsError> {
        let desc = self.texture(texture)?;
        if mip_level >= desc.mip_level_count {
            return Err(GraphicsError::InvalidParameter(format!(
                "mip level {mip_level} out of range for {texture} ({} levels)",
                desc.mip_level_count
            )));
        }
        Ok(TextureViewId(self.views.insert(TextureViewDescriptor {
            texture,
            mip_level,
        })))
    }

    /// Register a framebuffer.
    pub fn create_framebuffer(
        &mut self,
        descriptor: &FramebufferDescriptor,
    ) -> Result<FramebufferId, GraphicsError> {
        if descriptor.attachment_count() == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "framebuffer {:?} has no attachments",
                descriptor.label
            )));
        }
        for view in descriptor.attachments() {
            self.texture_view(view)?;
        }
        Ok(FramebufferId(self.framebuffers.insert(descriptor.clone())))
    }

    /// Register a program.
    pub fn create_program(
        &mut self,
        descriptor: &ProgramDescriptor,
    ) -> Result<ProgramId, GraphicsError> {
        Ok(ProgramId(self.programs.insert(descriptor.clone())))
    }

    /// Look up a buffer descriptor.
    pub fn buffer(&self, id: BufferId) -> Result<&BufferDescriptor, GraphicsError> {
        self.buffers
            .get(id.0)
            .ok_or_else(|| GraphicsError::InvalidHandle(id.to_string()))
    }

    /// Look up a texture descriptor.
    pub fn texture(&self, id: TextureId) -> Result<&TextureDescriptor, GraphicsError> {
        self.textures
            .get(id.0)
            .ok_or_else(|| GraphicsError::InvalidHandle(id.to_string()))
    }

    /// Look up a texture view descriptor.
    pub fn texture_view(&self, id: TextureViewId) -> Result<&TextureViewDescriptor, GraphicsError> {
        self.views
            .get(id.0)
            .ok_or_else(|| GraphicsError::InvalidHandle(id.to_string()))
    }

    /// Look up a framebuffer descriptor.
    pub fn framebuffer(&self, id: FramebufferId) -> Result<&FramebufferDescriptor, GraphicsError> {
        self.framebuffers
            .get(id.0)
            .ok_or_else(|| GraphicsError::InvalidHandle(id.to_string()))
    }

    /// Look up a program descriptor.
    pub fn program(&self, id: ProgramId) -> Result<&ProgramDescriptor, GraphicsError> {
        self.programs
            .get(id.0)
            .ok_or_else(|| GraphicsError::InvalidHandle(id.to_string()))
    }

    /// Destroy a buffer. Its handle stops resolving.
    pub fn destroy_buffer(&mut self, id: BufferId) -> bool {
        self.buffers.remove(id.0).is_some()
    }

    /// Destroy a texture. Views of it are left dangling and stop resolving
    /// through [`texture_view_target`](Self::texture_view_target).
    pub fn destroy_texture(&mut self, id: TextureId) -> bool {
        self.textures.remove(id.0).is_some()
    }

    /// Destroy a texture view. Framebuffers using it stop resolving.
    pub fn destroy_texture_view(&mut self, id: TextureViewId) -> bool {
        self.views.remove(id.0).is_some()
    }

    /// Destroy a framebuffer. Its attachments stay live.
    pub fn destroy_framebuffer(&mut self, id: FramebufferId) -> bool {
        self.framebuffers.remove(id.0).is_some()
    }

    /// Resolve a view to its texture and mip level, checking both are live.
    pub fn texture_view_target(
        &self,
        id: TextureViewId,
    ) -> Result<(TextureId, u32, &TextureDescriptor), GraphicsError> {
        let view = self.texture_view(id)?;
        let texture = self.texture(view.texture)?;
        Ok((view.texture, view.mip_level, texture))
    }

    /// Number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of live textures.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Number of live texture views.
    pub fn texture_view_count(&self) -> usize {
        self.views.len()
    }

    /// Number of live framebuffers.
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }
}

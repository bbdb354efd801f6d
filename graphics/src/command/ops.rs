//! Recorded operations.
//!
//! Once a session is stopped, the operation list is only read by backends
//! replaying the buffer. Producers never inspect it.

use std::sync::Arc;

use crate::resources::{
    BindingKind, BindingSlot, BufferId, FramebufferId, ProgramId, TextureId, TextureViewId,
};
use crate::types::{ClearValue, Extent3d, Origin3d, ScissorRect, Viewport};

use super::CommandBuffer;
use super::SyncPoint;

/// A resource bound to a program slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundResource {
    /// Range of a buffer. `size: None` binds everything after `offset`.
    Buffer {
        /// Bound buffer.
        buffer: BufferId,
        /// Byte offset of the range.
        offset: u64,
        /// Byte size of the range.
        size: Option<u64>,
    },
    /// Sampled texture.
    Texture(TextureId),
    /// Storage image.
    Image(TextureViewId),
    /// Attribute stream read from a buffer.
    VertexAttribute {
        /// Source buffer.
        buffer: BufferId,
        /// Byte offset of the first element.
        offset: u64,
        /// Byte distance between consecutive elements.
        stride: u32,
    },
}

impl BoundResource {
    /// Bind a whole buffer.
    pub fn buffer(buffer: BufferId) -> Self {
        Self::Buffer {
            buffer,
            offset: 0,
            size: None,
        }
    }

    /// Binding kind this resource satisfies.
    pub fn kind(&self) -> BindingKind {
        match self {
            Self::Buffer { .. } => BindingKind::Buffer,
            Self::Texture(_) => BindingKind::Texture,
            Self::Image(_) => BindingKind::Image,
            Self::VertexAttribute { .. } => BindingKind::VertexAttribute,
        }
    }
}

/// One slot assignment inside a `set_bindings` call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    /// Target slot.
    pub slot: BindingSlot,
    /// Bound resource.
    pub resource: BoundResource,
}

impl Binding {
    /// Create a binding.
    pub fn new(slot: impl Into<BindingSlot>, resource: BoundResource) -> Self {
        Self {
            slot: slot.into(),
            resource,
        }
    }
}

/// Color blending mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendState {
    /// Overwrite destination.
    #[default]
    Opaque,
    /// Source-over alpha blending.
    Alpha,
    /// Add source to destination.
    Additive,
}

/// Face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Draw both faces.
    #[default]
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    Back,
}

/// Rasterizer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    /// Culling mode.
    pub cull: CullMode,
    /// Draw edges only.
    pub wireframe: bool,
    /// Test fragments against the depth attachment.
    pub depth_test: bool,
    /// Write depth for passing fragments.
    pub depth_write: bool,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            cull: CullMode::Back,
            wireframe: false,
            depth_test: true,
            depth_write: true,
        }
    }
}

/// Bundle of fixed-function state applied by `set_state`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GraphicsState {
    /// Viewport; `None` covers the whole framebuffer.
    pub viewport: Option<Viewport>,
    /// Scissor; `None` disables scissoring.
    pub scissor: Option<ScissorRect>,
    /// Blend mode for every color attachment.
    pub blend: BlendState,
    /// Rasterizer state.
    pub raster: RasterState,
}

impl GraphicsState {
    /// Set the viewport.
    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    /// Set the scissor rectangle.
    pub fn with_scissor(mut self, scissor: ScissorRect) -> Self {
        self.scissor = Some(scissor);
        self
    }

    /// Set the blend mode.
    pub fn with_blend(mut self, blend: BlendState) -> Self {
        self.blend = blend;
        self
    }

    /// Set the rasterizer state.
    pub fn with_raster(mut self, raster: RasterState) -> Self {
        self.raster = raster;
        self
    }
}

/// Draw parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawCall {
    /// Non-indexed draw.
    Regular {
        /// Vertices per instance.
        vertex_count: u32,
        /// Number of instances.
        instance_count: u32,
        /// First vertex.
        first_vertex: u32,
        /// First instance.
        first_instance: u32,
    },
    /// Indexed draw.
    Indexed {
        /// Buffer holding `u32` indices.
        index_buffer: BufferId,
        /// Indices per instance.
        index_count: u32,
        /// Number of instances.
        instance_count: u32,
        /// First index.
        first_index: u32,
        /// Value added to each index.
        base_vertex: i32,
        /// First instance.
        first_instance: u32,
    },
    /// Draw whose arguments are read from a buffer at execution time.
    Indirect {
        /// Buffer holding [`DrawIndirectArgs`](crate::types::DrawIndirectArgs)
        /// or [`DrawIndexedIndirectArgs`](crate::types::DrawIndexedIndirectArgs).
        buffer: BufferId,
        /// Byte offset of the arguments.
        offset: u64,
        /// Index buffer, for indexed indirect draws.
        index_buffer: Option<BufferId>,
    },
}

impl DrawCall {
    /// Non-indexed draw starting at vertex and instance zero.
    pub fn regular(vertex_count: u32, instance_count: u32) -> Self {
        Self::Regular {
            vertex_count,
            instance_count,
            first_vertex: 0,
            first_instance: 0,
        }
    }

    /// Indexed draw starting at index zero.
    pub fn indexed(index_buffer: BufferId, index_count: u32, instance_count: u32) -> Self {
        Self::Indexed {
            index_buffer,
            index_count,
            instance_count,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        }
    }

    /// Non-indexed indirect draw.
    pub fn indirect(buffer: BufferId, offset: u64) -> Self {
        Self::Indirect {
            buffer,
            offset,
            index_buffer: None,
        }
    }
}

/// One region of a texture-to-texture copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureCopyRegion {
    /// Source mip level.
    pub src_mip: u32,
    /// Source texel offset.
    pub src_origin: Origin3d,
    /// Destination mip level.
    pub dst_mip: u32,
    /// Destination texel offset.
    pub dst_origin: Origin3d,
    /// Copied extent.
    pub size: Extent3d,
}

impl TextureCopyRegion {
    /// Copy `size` texels between the origins of the same mip level.
    pub fn mip(mip: u32, size: Extent3d) -> Self {
        Self {
            src_mip: mip,
            src_origin: Origin3d::ZERO,
            dst_mip: mip,
            dst_origin: Origin3d::ZERO,
            size,
        }
    }
}

/// What happens to an attachment's contents when a framebuffer is bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttachmentLoad {
    /// Fill with a clear value.
    Clear(ClearValue),
    /// Contents become undefined.
    Invalidate,
    /// Keep previous contents.
    Reuse,
}

/// A recorded operation.
#[derive(Debug, Clone)]
pub enum Command {
    /// Select the program used by following dispatches and draws.
    SetProgram(ProgramId),
    /// Assign resources to slots; later assignments to a slot win.
    SetBindings(Vec<Binding>),
    /// Apply fixed-function state.
    SetState(GraphicsState),
    /// Launch the current compute program.
    Dispatch {
        /// Work-group counts.
        groups: [u32; 3],
    },
    /// Launch the current graphics program.
    Draw(DrawCall),
    /// Copy regions between textures.
    CopyTexture {
        /// Source texture.
        src: TextureId,
        /// Destination texture.
        dst: TextureId,
        /// Copied regions.
        regions: Vec<TextureCopyRegion>,
    },
    /// Fill a buffer range with a repeated 32-bit value.
    FillBuffer {
        /// Filled buffer.
        buffer: BufferId,
        /// Byte offset, multiple of 4.
        offset: u64,
        /// Byte size, multiple of 4.
        size: u64,
        /// Repeated value.
        value: u32,
    },
    /// Bind a framebuffer, applying one load policy per attachment.
    SetFramebuffer {
        /// Bound framebuffer.
        framebuffer: FramebufferId,
        /// Load policies in attachment order.
        loads: Vec<AttachmentLoad>,
    },
    /// Replay another invokable buffer inline.
    ExecuteCommandBuffer(Arc<CommandBuffer>),
    /// Mark a point other buffers may wait on.
    SignalSyncPoint(SyncPoint),
    /// Wait until another buffer has passed a sync point.
    WaitSyncPoint(SyncPoint),
}

impl Command {
    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SetProgram(_) => "set_program",
            Self::SetBindings(_) => "set_bindings",
            Self::SetState(_) => "set_state",
            Self::Dispatch { .. } => "dispatch",
            Self::Draw(_) => "draw",
            Self::CopyTexture { .. } => "copy_texture",
            Self::FillBuffer { .. } => "fill_buffer",
            Self::SetFramebuffer { .. } => "set_framebuffer",
            Self::ExecuteCommandBuffer(_) => "execute_command_buffer",
            Self::SignalSyncPoint(_) => "signal_sync_point",
            Self::WaitSyncPoint(_) => "wait_sync_point",
        }
    }
}

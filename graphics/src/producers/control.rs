//! UI control rasterizer.
//!
//! Controls are axis-aligned colored rectangles in target pixel
//! coordinates. A CPU task packs them into an instance buffer and writes
//! the instance count into indirect draw arguments; the draw clears the
//! target and blends one quad per instance.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use parking_lot::Mutex;

use crate::backend::{DispatchInvocation, KernelContext};
use crate::command::{
    AttachmentLoad, Binding, BlendState, BoundResource, CommandBuffer, CommandBufferDescriptor,
    CullMode, DrawCall, GraphicsState, RasterState,
};
use crate::error::GraphicsError;
use crate::resources::{
    BindingKind, BufferId, FramebufferDescriptor, FramebufferId, ProgramDescriptor, ProgramId,
    ProgramLayout, ResourceAllocator, TextureId, TextureViewId,
};
use crate::task::{PresentTask, TaskGroupBuilder};
use crate::types::{
    BufferDescriptor, BufferUsage, ClearValue, DrawIndirectArgs, TextureDescriptor, TextureFormat,
    TextureUsage, Viewport,
};

use super::{CachedTaskPair, TaskProducer};

/// Vertices emitted per control quad.
const QUAD_VERTICES: u32 = 6;

/// One UI control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Control {
    /// Top-left corner in pixels.
    pub position: Vec2,
    /// Width and height in pixels.
    pub size: Vec2,
    /// Straight-alpha RGBA color.
    pub color: [f32; 4],
}

impl Control {
    /// Create a control.
    pub fn new(position: Vec2, size: Vec2, color: [f32; 4]) -> Self {
        Self {
            position,
            size,
            color,
        }
    }
}

/// Per-instance data read by the raster program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ControlInstance {
    /// `x, y, width, height` in pixels.
    pub rect: [f32; 4],
    /// RGBA color.
    pub color: [f32; 4],
}

impl ControlInstance {
    /// Byte size of one instance.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

impl From<&Control> for ControlInstance {
    fn from(control: &Control) -> Self {
        Self {
            rect: [
                control.position.x,
                control.position.y,
                control.size.x,
                control.size.y,
            ],
            color: control.color,
        }
    }
}

/// Control rasterizer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlRasterizerConfig {
    /// Target width in pixels.
    pub width: u32,
    /// Target height in pixels.
    pub height: u32,
    /// Instance buffer capacity.
    pub max_controls: u32,
    /// Color the target is cleared to.
    pub background: [f32; 4],
}

impl Default for ControlRasterizerConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            max_controls: 256,
            background: [0.0, 0.0, 0.0, 0.0],
        }
    }
}

impl ControlRasterizerConfig {
    /// Set the target size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the instance capacity.
    pub fn with_max_controls(mut self, max_controls: u32) -> Self {
        self.max_controls = max_controls;
        self
    }

    /// Set the clear color.
    pub fn with_background(mut self, background: [f32; 4]) -> Self {
        self.background = background;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct RenderTarget {
    texture: TextureId,
    view: TextureViewId,
    framebuffer: FramebufferId,
}

/// Producer of a texture holding rasterized UI controls.
pub struct ControlRasterizer {
    program: ProgramId,
    config: ControlRasterizerConfig,
    instances: BufferId,
    args: BufferId,
    target: RenderTarget,
    controls: Arc<Mutex<Vec<Control>>>,
    cache: CachedTaskPair,
}

impl ControlRasterizer {
    /// Descriptor of the program this producer draws with.
    pub fn program_descriptor() -> ProgramDescriptor {
        ProgramDescriptor::graphics()
            .with_label("control_raster")
            .with_layout(
                ProgramLayout::new()
                    .with_binding("controls", 0, BindingKind::VertexAttribute)
                    .with_binding("args", 1, BindingKind::Buffer),
            )
    }

    /// CPU implementation of [`program_descriptor`](Self::program_descriptor).
    ///
    /// Fills every pixel whose center lies inside a control rectangle,
    /// clipped to the viewport and scissor, blending per the bound blend
    /// state.
    pub fn rasterize(ctx: &mut KernelContext<'_>) -> Result<(), GraphicsError> {
        thistle_core::profile_function!();
        let DispatchInvocation::Draw { call, .. } = ctx.invocation() else {
            return Err(GraphicsError::InvalidParameter(
                "controls must be drawn".to_string(),
            ));
        };
        let (first, count) = match call {
            DrawCall::Regular {
                instance_count,
                first_instance,
                ..
            } => (first_instance, instance_count),
            DrawCall::Indirect { .. } => {
                let args: DrawIndirectArgs = ctx.read_pod("args")?;
                (args.first_instance, args.instance_count)
            }
            DrawCall::Indexed { .. } => {
                return Err(GraphicsError::InvalidParameter(
                    "controls are not indexed".to_string(),
                ));
            }
        };

        let view = ctx.color_attachment(0)?;
        let (extent, format) = ctx.view_info(view)?;
        if !matches!(format, TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb) {
            return Err(GraphicsError::InvalidParameter(format!(
                "control target format {format:?} is not RGBA8"
            )));
        }
        let data = ctx.read_buffer("controls")?;
        let instances: Vec<ControlInstance> = data
            .chunks_exact(ControlInstance::SIZE as usize)
            .skip(first as usize)
            .take(count as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect();

        let state = *ctx.graphics_state();
        let clip = clip_rect(&state, extent.width, extent.height);
        let mut pixels = ctx.read_view(view)?;
        for instance in &instances {
            let [x, y, w, h] = instance.rect;
            let x0 = (x - 0.5).ceil().max(clip[0]) as u32;
            let y0 = (y - 0.5).ceil().max(clip[1]) as u32;
            let x1 = (x + w - 0.5).ceil().min(clip[2]).max(0.0) as u32;
            let y1 = (y + h - 0.5).ceil().min(clip[3]).max(0.0) as u32;
            for py in y0..y1 {
                for px in x0..x1 {
                    let i = ((py * extent.width + px) * 4) as usize;
                    blend(state.blend, &mut pixels[i..i + 4], instance.color);
                }
            }
        }
        ctx.write_view(view, &pixels)
    }

    /// Allocate the target and instance buffers and build the tasks.
    ///
    /// `program` must have been registered from
    /// [`program_descriptor`](Self::program_descriptor).
    pub fn new(
        allocator: &mut dyn ResourceAllocator,
        program: ProgramId,
        config: ControlRasterizerConfig,
    ) -> Result<Self, GraphicsError> {
        if config.max_controls == 0 {
            return Err(GraphicsError::InvalidParameter(
                "control capacity is zero".to_string(),
            ));
        }
        let instances = allocator.create_buffer(
            &BufferDescriptor::new(
                u64::from(config.max_controls) * ControlInstance::SIZE,
                BufferUsage::VERTEX | BufferUsage::HOST_WRITE,
            )
            .with_label("control_instances"),
        )?;
        let args = allocator.create_buffer(
            &BufferDescriptor::new(
                DrawIndirectArgs::SIZE,
                BufferUsage::INDIRECT | BufferUsage::HOST_WRITE,
            )
            .with_label("control_args"),
        )?;
        let target = create_target(allocator, config.width, config.height)?;
        let controls = Arc::new(Mutex::new(Vec::new()));
        let cache = build_tasks(allocator, program, &config, instances, args, target, &controls)?;
        log::debug!(
            "ControlRasterizer: {}x{} target {}",
            config.width,
            config.height,
            target.texture
        );
        Ok(Self {
            program,
            config,
            instances,
            args,
            target,
            controls,
            cache,
        })
    }

    /// Active settings.
    pub fn config(&self) -> &ControlRasterizerConfig {
        &self.config
    }

    /// Texture the controls are rasterized into.
    pub fn target_texture(&self) -> TextureId {
        self.target.texture
    }

    /// View of the target texture.
    pub fn target_view(&self) -> TextureViewId {
        self.target.view
    }

    /// Framebuffer wrapping the target.
    pub fn framebuffer(&self) -> FramebufferId {
        self.target.framebuffer
    }

    /// Instance buffer of [`ControlInstance`] values.
    pub fn instance_buffer(&self) -> BufferId {
        self.instances
    }

    /// Current controls.
    pub fn controls(&self) -> Vec<Control> {
        self.controls.lock().clone()
    }

    /// Replace the control list. Marks the target dirty if it changed.
    pub fn set_controls(&self, controls: Vec<Control>) -> Result<(), GraphicsError> {
        self.check_capacity(controls.len())?;
        let mut current = self.controls.lock();
        if *current != controls {
            *current = controls;
            self.cache.mark_dirty();
        }
        Ok(())
    }

    /// Append a control.
    pub fn push_control(&self, control: Control) -> Result<(), GraphicsError> {
        let mut current = self.controls.lock();
        self.check_capacity(current.len() + 1)?;
        current.push(control);
        self.cache.mark_dirty();
        Ok(())
    }

    /// Remove every control.
    pub fn clear_controls(&self) {
        let mut current = self.controls.lock();
        if !current.is_empty() {
            current.clear();
            self.cache.mark_dirty();
        }
    }

    /// Reallocate the target at a new size.
    ///
    /// Rebuilds the command buffer and both cached tasks and frees the old
    /// target texture, view and framebuffer.
    pub fn resize(
        &mut self,
        allocator: &mut dyn ResourceAllocator,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError> {
        if (width, height) == (self.config.width, self.config.height) {
            return Ok(());
        }
        let config = ControlRasterizerConfig {
            width,
            height,
            ..self.config
        };
        let target = create_target(allocator, width, height)?;
        let cache = match build_tasks(
            allocator,
            self.program,
            &config,
            self.instances,
            self.args,
            target,
            &self.controls,
        ) {
            Ok(cache) => cache,
            Err(err) => {
                destroy_target(allocator, target);
                return Err(err);
            }
        };
        destroy_target(allocator, self.target);
        log::debug!(
            "ControlRasterizer: resized {}x{} -> {width}x{height}",
            self.config.width,
            self.config.height
        );
        self.config = config;
        self.target = target;
        self.cache = cache;
        Ok(())
    }

    fn check_capacity(&self, count: usize) -> Result<(), GraphicsError> {
        if count > self.config.max_controls as usize {
            return Err(GraphicsError::InvalidParameter(format!(
                "{count} controls exceed the capacity of {}",
                self.config.max_controls
            )));
        }
        Ok(())
    }
}

impl TaskProducer for ControlRasterizer {
    fn name(&self) -> &str {
        "controls"
    }

    fn cache(&self) -> &CachedTaskPair {
        &self.cache
    }
}

impl std::fmt::Debug for ControlRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlRasterizer")
            .field("config", &self.config)
            .field("target", &self.target)
            .field("controls", &self.controls.lock().len())
            .field("cache", &self.cache)
            .finish()
    }
}

fn create_target(
    allocator: &mut dyn ResourceAllocator,
    width: u32,
    height: u32,
) -> Result<RenderTarget, GraphicsError> {
    if width == 0 || height == 0 {
        return Err(GraphicsError::InvalidParameter(format!(
            "control target {width}x{height} is empty"
        )));
    }
    let texture = allocator.create_texture(
        &TextureDescriptor::new_2d(
            width,
            height,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_SRC,
        )
        .with_label("control_target"),
    )?;
    let view = match allocator.create_texture_view(texture, 0) {
        Ok(view) => view,
        Err(err) => {
            allocator.destroy_texture(texture);
            return Err(err);
        }
    };
    let framebuffer = match allocator.create_framebuffer(
        &FramebufferDescriptor::new()
            .with_color(view)
            .with_label("control_target"),
    ) {
        Ok(framebuffer) => framebuffer,
        Err(err) => {
            allocator.destroy_texture_view(view);
            allocator.destroy_texture(texture);
            return Err(err);
        }
    };
    Ok(RenderTarget {
        texture,
        view,
        framebuffer,
    })
}

fn destroy_target(allocator: &mut dyn ResourceAllocator, target: RenderTarget) {
    allocator.destroy_framebuffer(target.framebuffer);
    allocator.destroy_texture_view(target.view);
    allocator.destroy_texture(target.texture);
}

fn build_tasks(
    allocator: &mut dyn ResourceAllocator,
    program: ProgramId,
    config: &ControlRasterizerConfig,
    instances: BufferId,
    args: BufferId,
    target: RenderTarget,
    controls: &Arc<Mutex<Vec<Control>>>,
) -> Result<CachedTaskPair, GraphicsError> {
    let shared = Arc::clone(controls);
    let upload = PresentTask::cpu(
        "controls_upload",
        [],
        [instances.into(), args.into()],
        move |ctx| {
            let packed: Vec<ControlInstance> =
                shared.lock().iter().map(ControlInstance::from).collect();
            ctx.write_buffer(instances, 0, bytemuck::cast_slice(&packed))?;
            ctx.write_pod(args, 0, &DrawIndirectArgs::new(QUAD_VERTICES, packed.len() as u32))
        },
    )?;

    let state = GraphicsState::default()
        .with_viewport(Viewport::from_dimensions(config.width, config.height))
        .with_blend(BlendState::Alpha)
        .with_raster(RasterState {
            cull: CullMode::None,
            wireframe: false,
            depth_test: false,
            depth_write: false,
        });
    let [r, g, b, a] = config.background;

    let mut cmd = CommandBuffer::new(CommandBufferDescriptor::graphics().with_label("control_raster"));
    let mut rec = cmd.start_recording(allocator.registry(), Some(target.framebuffer))?;
    rec.set_framebuffer(
        target.framebuffer,
        &[AttachmentLoad::Clear(ClearValue::color(r, g, b, a))],
    )?;
    rec.set_state(state)?;
    rec.set_program(program)?;
    rec.set_bindings(&[
        Binding::new(
            "controls",
            BoundResource::VertexAttribute {
                buffer: instances,
                offset: 0,
                stride: ControlInstance::SIZE as u32,
            },
        ),
        Binding::new("args", BoundResource::buffer(args)),
    ])?;
    rec.draw(DrawCall::indirect(args, 0))?;
    rec.finish();
    let draw = PresentTask::gpu(
        "controls_draw",
        Arc::new(cmd),
        [instances.into(), args.into()],
        [target.texture.into()],
    )?;

    let mut group = TaskGroupBuilder::new("controls");
    let upload = group.add_member(upload);
    let draw = group.add_member(draw);
    group.connect(upload, 0, draw, 0);
    group.connect(upload, 1, draw, 1);
    group.expose_output(target.texture, draw, 0);
    let full = group.build()?;
    let cached = PresentTask::pass_through("controls_cached", [target.texture.into()])?;
    CachedTaskPair::new(full, cached)
}

/// Pixel bounds `[x0, y0, x1, y1]` that draws may touch.
fn clip_rect(state: &GraphicsState, width: u32, height: u32) -> [f32; 4] {
    let mut clip = [0.0, 0.0, width as f32, height as f32];
    if let Some(viewport) = state.viewport {
        clip[0] = clip[0].max(viewport.x);
        clip[1] = clip[1].max(viewport.y);
        clip[2] = clip[2].min(viewport.x + viewport.width);
        clip[3] = clip[3].min(viewport.y + viewport.height);
    }
    if let Some(scissor) = state.scissor {
        clip[0] = clip[0].max(scissor.x as f32);
        clip[1] = clip[1].max(scissor.y as f32);
        clip[2] = clip[2].min(scissor.x as f32 + scissor.width as f32);
        clip[3] = clip[3].min(scissor.y as f32 + scissor.height as f32);
    }
    clip
}

fn blend(mode: BlendState, dst: &mut [u8], src: [f32; 4]) {
    let alpha = src[3].clamp(0.0, 1.0);
    for (channel, &value) in dst.iter_mut().zip(&src) {
        let d = f32::from(*channel) / 255.0;
        let out = match mode {
            BlendState::Opaque => value,
            BlendState::Alpha => value * alpha + d * (1.0 - alpha),
            BlendState::Additive => d + value * alpha,
        };
        *channel = (out.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
}

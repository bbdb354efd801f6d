//! Metaball scalar field.
//!
//! A CPU task uploads the metaball list into a uniform block, then a compute
//! dispatch evaluates `sum(r^2 / d^2)` at every grid sample of a 3D
//! `R32Float` texture.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use parking_lot::Mutex;

use crate::backend::{DispatchInvocation, KernelContext};
use crate::command::{Binding, BoundResource, CommandBuffer, CommandBufferDescriptor};
use crate::error::GraphicsError;
use crate::resources::{
    BindingKind, BufferId, ProgramDescriptor, ProgramId, ProgramLayout, ResourceAllocator,
};
use crate::task::{PresentTask, TaskGroupBuilder};
use crate::types::{BufferDescriptor, TextureDescriptor, TextureFormat, TextureUsage};

use super::{grid_coord, CachedTaskPair, FieldSource, TaskProducer};

/// Capacity of the metaball uniform block.
pub const MAX_METABALLS: usize = 32;

const WORKGROUP_SIZE: u32 = 4;

/// Squared distance below which a sample counts as the metaball center.
const CENTER_EPSILON: f32 = 1e-6;

/// One metaball.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metaball {
    /// Center in field space, inside `[-1, 1]^3` to be visible.
    pub center: Vec3,
    /// Radius at which the ball alone reaches field value 1.
    pub radius: f32,
}

impl Metaball {
    /// Create a metaball.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }
}

/// Uniform block read by the field program.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FieldUniforms {
    /// Samples per axis.
    pub resolution: u32,
    /// Used entries of `balls`.
    pub count: u32,
    _pad: [u32; 2],
    /// `xyz` center, `w` radius.
    pub balls: [[f32; 4]; MAX_METABALLS],
}

impl FieldUniforms {
    /// Pack up to [`MAX_METABALLS`] metaballs.
    pub fn new(resolution: u32, metaballs: &[Metaball]) -> Self {
        let mut uniforms = Self::zeroed();
        uniforms.resolution = resolution;
        for (slot, ball) in uniforms.balls.iter_mut().zip(metaballs) {
            *slot = ball.center.extend(ball.radius).to_array();
            uniforms.count += 1;
        }
        uniforms
    }

    fn metaballs(&self) -> impl Iterator<Item = Metaball> + '_ {
        self.balls
            .iter()
            .take(self.count as usize)
            .map(|b| Metaball::new(Vec3::new(b[0], b[1], b[2]), b[3]))
    }
}

/// Field value of `metaballs` at `position`.
pub fn field_value(metaballs: impl IntoIterator<Item = Metaball>, position: Vec3) -> f32 {
    metaballs
        .into_iter()
        .map(|ball| {
            let d2 = ball.center.distance_squared(position).max(CENTER_EPSILON);
            ball.radius * ball.radius / d2
        })
        .sum()
}

/// Producer of a metaball scalar field.
pub struct MetaballField {
    program: ProgramId,
    params: BufferId,
    source: FieldSource,
    metaballs: Arc<Mutex<Vec<Metaball>>>,
    cache: CachedTaskPair,
}

impl MetaballField {
    /// Descriptor of the program this producer dispatches.
    pub fn program_descriptor() -> ProgramDescriptor {
        ProgramDescriptor::compute()
            .with_label("metaball_field")
            .with_layout(
                ProgramLayout::new()
                    .with_binding("params", 0, BindingKind::Buffer)
                    .with_binding("field", 1, BindingKind::Image),
            )
    }

    /// CPU implementation of [`program_descriptor`](Self::program_descriptor).
    ///
    /// Only samples covered by the dispatched work groups are written.
    pub fn evaluate(ctx: &mut KernelContext<'_>) -> Result<(), GraphicsError> {
        thistle_core::profile_function!();
        let DispatchInvocation::Compute { groups } = ctx.invocation() else {
            return Err(GraphicsError::InvalidParameter(
                "metaball field must be dispatched".to_string(),
            ));
        };
        let uniforms: FieldUniforms = ctx.read_pod("params")?;
        let n = uniforms.resolution;
        let (extent, format) = ctx.image_info("field")?;
        if format != TextureFormat::R32Float
            || (extent.width, extent.height, extent.depth) != (n, n, n)
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "field image is {extent:?} {format:?}, expected {n}^3 R32Float"
            )));
        }

        let balls: Vec<Metaball> = uniforms.metaballs().collect();
        let limit = |axis: usize| (groups[axis].saturating_mul(WORKGROUP_SIZE)).min(n);
        let mut values: Vec<f32> = bytemuck::pod_collect_to_vec(&ctx.read_image("field")?);
        for z in 0..limit(2) {
            for y in 0..limit(1) {
                for x in 0..limit(0) {
                    let p = Vec3::new(grid_coord(x, n), grid_coord(y, n), grid_coord(z, n));
                    let i = ((z * n + y) * n + x) as usize;
                    values[i] = field_value(balls.iter().copied(), p);
                }
            }
        }
        ctx.write_image("field", bytemuck::cast_slice(&values))
    }

    /// Allocate a `resolution^3` field and build its tasks.
    ///
    /// `program` must have been registered from
    /// [`program_descriptor`](Self::program_descriptor).
    pub fn new(
        allocator: &mut dyn ResourceAllocator,
        program: ProgramId,
        resolution: u32,
    ) -> Result<Self, GraphicsError> {
        let params = allocator.create_buffer(
            &BufferDescriptor::uniform(std::mem::size_of::<FieldUniforms>() as u64)
                .with_label("metaball_params"),
        )?;
        let source = create_field(allocator, resolution)?;
        let metaballs = Arc::new(Mutex::new(Vec::new()));
        let cache = build_tasks(allocator, program, params, source, &metaballs)?;
        log::debug!("MetaballField: created {resolution}^3 field {}", source.texture);
        Ok(Self {
            program,
            params,
            source,
            metaballs,
            cache,
        })
    }

    /// The field this producer writes.
    pub fn source(&self) -> FieldSource {
        self.source
    }

    /// Uniform buffer holding the packed metaballs.
    pub fn params_buffer(&self) -> BufferId {
        self.params
    }

    /// Samples per axis.
    pub fn resolution(&self) -> u32 {
        self.source.resolution
    }

    /// Current metaballs.
    pub fn metaballs(&self) -> Vec<Metaball> {
        self.metaballs.lock().clone()
    }

    /// Replace all metaballs. Marks the field dirty if anything changed.
    pub fn set_metaballs(&self, metaballs: Vec<Metaball>) -> Result<(), GraphicsError> {
        check_count(metaballs.len())?;
        let mut current = self.metaballs.lock();
        if *current != metaballs {
            *current = metaballs;
            self.cache.mark_dirty();
        }
        Ok(())
    }

    /// Append a metaball.
    pub fn push_metaball(&self, metaball: Metaball) -> Result<(), GraphicsError> {
        let mut current = self.metaballs.lock();
        check_count(current.len() + 1)?;
        current.push(metaball);
        self.cache.mark_dirty();
        Ok(())
    }

    /// Move metaball `index`.
    pub fn move_metaball(&self, index: usize, center: Vec3) -> Result<(), GraphicsError> {
        self.update(index, |ball| ball.center = center)
    }

    /// Change the radius of metaball `index`.
    pub fn set_radius(&self, index: usize, radius: f32) -> Result<(), GraphicsError> {
        self.update(index, |ball| ball.radius = radius)
    }

    /// Reallocate the field at a new resolution.
    ///
    /// Rebuilds the command buffer and both cached tasks and frees the old
    /// field texture and view. Consumers of [`source`](Self::source) must be pointed
    /// at the new field.
    pub fn set_resolution(
        &mut self,
        allocator: &mut dyn ResourceAllocator,
        resolution: u32,
    ) -> Result<(), GraphicsError> {
        if resolution == self.source.resolution {
            return Ok(());
        }
        let source = create_field(allocator, resolution)?;
        let cache = match build_tasks(allocator, self.program, self.params, source, &self.metaballs)
        {
            Ok(cache) => cache,
            Err(err) => {
                destroy_field(allocator, source);
                return Err(err);
            }
        };
        destroy_field(allocator, self.source);
        log::debug!(
            "MetaballField: resolution {} -> {resolution}",
            self.source.resolution
        );
        self.source = source;
        self.cache = cache;
        Ok(())
    }

    fn update(&self, index: usize, change: impl FnOnce(&mut Metaball)) -> Result<(), GraphicsError> {
        let mut current = self.metaballs.lock();
        let count = current.len();
        let ball = current.get_mut(index).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("metaball {index} of {count}"))
        })?;
        let before = *ball;
        change(ball);
        if *ball != before {
            self.cache.mark_dirty();
        }
        Ok(())
    }
}

impl TaskProducer for MetaballField {
    fn name(&self) -> &str {
        "metaball_field"
    }

    fn cache(&self) -> &CachedTaskPair {
        &self.cache
    }
}

impl std::fmt::Debug for MetaballField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaballField")
            .field("source", &self.source)
            .field("metaballs", &self.metaballs.lock().len())
            .field("cache", &self.cache)
            .finish()
    }
}

fn check_count(count: usize) -> Result<(), GraphicsError> {
    if count > MAX_METABALLS {
        return Err(GraphicsError::InvalidParameter(format!(
            "{count} metaballs exceed the limit of {MAX_METABALLS}"
        )));
    }
    Ok(())
}

fn create_field(
    allocator: &mut dyn ResourceAllocator,
    resolution: u32,
) -> Result<FieldSource, GraphicsError> {
    if resolution < 2 {
        return Err(GraphicsError::InvalidParameter(format!(
            "field resolution {resolution} is below 2"
        )));
    }
    let texture = allocator.create_texture(
        &TextureDescriptor::new_3d(
            resolution,
            resolution,
            resolution,
            TextureFormat::R32Float,
            TextureUsage::STORAGE_BINDING | TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_SRC,
        )
        .with_label("metaball_field"),
    )?;
    let view = match allocator.create_texture_view(texture, 0) {
        Ok(view) => view,
        Err(err) => {
            allocator.destroy_texture(texture);
            return Err(err);
        }
    };
    Ok(FieldSource {
        texture,
        view,
        resolution,
    })
}

fn destroy_field(allocator: &mut dyn ResourceAllocator, source: FieldSource) {
    allocator.destroy_texture_view(source.view);
    allocator.destroy_texture(source.texture);
}

fn build_tasks(
    allocator: &mut dyn ResourceAllocator,
    program: ProgramId,
    params: BufferId,
    source: FieldSource,
    metaballs: &Arc<Mutex<Vec<Metaball>>>,
) -> Result<CachedTaskPair, GraphicsError> {
    let resolution = source.resolution;
    let shared = Arc::clone(metaballs);
    let upload = PresentTask::cpu("metaball_upload", [], [params.into()], move |ctx| {
        let uniforms = FieldUniforms::new(resolution, &shared.lock());
        ctx.write_pod(params, 0, &uniforms)
    })?;

    let mut cmd = CommandBuffer::new(CommandBufferDescriptor::compute().with_label("metaball_field"));
    let mut rec = cmd.start_recording(allocator.registry(), None)?;
    rec.set_program(program)?;
    rec.set_bindings(&[
        Binding::new("params", BoundResource::buffer(params)),
        Binding::new("field", BoundResource::Image(source.view)),
    ])?;
    let groups = resolution.div_ceil(WORKGROUP_SIZE);
    rec.dispatch(groups, groups, groups)?;
    rec.finish();
    let compute = PresentTask::gpu(
        "metaball_compute",
        Arc::new(cmd),
        [params.into()],
        [source.texture.into()],
    )?;

    let mut group = TaskGroupBuilder::new("metaball_field");
    let upload = group.add_member(upload);
    let compute = group.add_member(compute);
    group.connect(upload, 0, compute, 0);
    group.expose_output(source.texture, compute, 0);
    let full = group.build()?;
    let cached = PresentTask::pass_through("metaball_field_cached", [source.texture.into()])?;
    CachedTaskPair::new(full, cached)
}

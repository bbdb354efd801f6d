//! Iso-surface extraction with marching cubes.
//!
//! Each grid cell is split into six tetrahedra along its main diagonal, so
//! neighboring cells always agree on shared faces. The kernel writes a flat
//! triangle list with per-vertex normals and fills the indirect draw
//! arguments that render it, so the vertex count never travels back to the
//! CPU.

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
use crate::types::{BufferDescriptor, BufferUsage, DrawIndirectArgs, TextureFormat};

use super::{grid_coord, CachedTaskPair, FieldSource, TaskProducer};

const WORKGROUP_SIZE: u32 = 4;

/// Kuhn triangulation of the unit cube. Corner `c` sits at
/// `(c & 1, (c >> 1) & 1, (c >> 2) & 1)`.
const CUBE_TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

/// One generated vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    /// Position in field space.
    pub position: [f32; 3],
    /// Outward unit normal.
    pub normal: [f32; 3],
}

impl MeshVertex {
    /// Byte size of one vertex.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

/// Uniform block read by the meshing program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshUniforms {
    /// Field value of the surface.
    pub isolevel: f32,
    /// Samples per axis of the source field.
    pub resolution: u32,
    /// Capacity of the vertex buffer.
    pub max_vertices: u32,
    _pad: u32,
}

impl MeshUniforms {
    /// Pack the meshing parameters.
    pub fn new(isolevel: f32, resolution: u32, max_vertices: u32) -> Self {
        Self {
            isolevel,
            resolution,
            max_vertices,
            _pad: 0,
        }
    }
}

/// Iso-surface settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsoSurfaceConfig {
    /// Initial isolevel.
    pub isolevel: f32,
    /// Vertex buffer capacity; triangles past it are dropped.
    pub max_vertices: u32,
}

impl Default for IsoSurfaceConfig {
    fn default() -> Self {
        Self {
            isolevel: 1.0,
            max_vertices: 3 * 16384,
        }
    }
}

impl IsoSurfaceConfig {
    /// Set the initial isolevel.
    pub fn with_isolevel(mut self, isolevel: f32) -> Self {
        self.isolevel = isolevel;
        self
    }

    /// Set the vertex buffer capacity.
    pub fn with_max_vertices(mut self, max_vertices: u32) -> Self {
        self.max_vertices = max_vertices;
        self
    }
}

/// Producer of a triangle mesh enclosing the region where a scalar field
/// exceeds the isolevel.
pub struct IsoSurfaceMesh {
    program: ProgramId,
    source: FieldSource,
    max_vertices: u32,
    buffers: MeshBuffers,
    isolevel: Arc<Mutex<f32>>,
    cache: CachedTaskPair,
}

#[derive(Debug, Clone, Copy)]
struct MeshBuffers {
    params: BufferId,
    vertices: BufferId,
    args: BufferId,
}

impl IsoSurfaceMesh {
    /// Descriptor of the program this producer dispatches.
    pub fn program_descriptor() -> ProgramDescriptor {
        ProgramDescriptor::compute()
            .with_label("marching_cubes")
            .with_layout(
                ProgramLayout::new()
                    .with_binding("params", 0, BindingKind::Buffer)
                    .with_binding("field", 1, BindingKind::Texture)
                    .with_binding("vertices", 2, BindingKind::Buffer)
                    .with_binding("args", 3, BindingKind::Buffer),
            )
    }

    /// CPU implementation of [`program_descriptor`](Self::program_descriptor).
    pub fn polygonize(ctx: &mut KernelContext<'_>) -> Result<(), GraphicsError> {
        thistle_core::profile_function!();
        let DispatchInvocation::Compute { groups } = ctx.invocation() else {
            return Err(GraphicsError::InvalidParameter(
                "marching cubes must be dispatched".to_string(),
            ));
        };
        let uniforms: MeshUniforms = ctx.read_pod("params")?;
        let n = uniforms.resolution;
        let (extent, format) = ctx.image_info("field")?;
        if format != TextureFormat::R32Float
            || (extent.width, extent.height, extent.depth) != (n, n, n)
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "field is {extent:?} {format:?}, expected {n}^3 R32Float"
            )));
        }
        let values: Vec<f32> = bytemuck::pod_collect_to_vec(&ctx.read_image("field")?);
        let grid = Grid { values: &values, n };

        let cells = n.saturating_sub(1);
        let limit = |axis: usize| groups[axis].saturating_mul(WORKGROUP_SIZE).min(cells);
        let mut mesh = MeshBuilder::new(uniforms.max_vertices);
        for z in 0..limit(2) {
            for y in 0..limit(1) {
                for x in 0..limit(0) {
                    polygonize_cell(&grid, [x, y, z], uniforms.isolevel, &mut mesh);
                }
            }
        }
        if mesh.dropped > 0 {
            log::warn!(
                "Marching cubes: dropped {} triangles past {} vertices",
                mesh.dropped,
                uniforms.max_vertices
            );
        }

        let count = mesh.vertices.len() as u32;
        ctx.write_buffer("vertices", 0, bytemuck::cast_slice(&mesh.vertices))?;
        ctx.write_buffer("args", 0, bytemuck::bytes_of(&DrawIndirectArgs::new(count, 1)))
    }

    /// Allocate the mesh buffers and build the tasks reading `source`.
    ///
    /// `program` must have been registered from
    /// [`program_descriptor`](Self::program_descriptor).
    pub fn new(
        allocator: &mut dyn ResourceAllocator,
        program: ProgramId,
        source: FieldSource,
        config: IsoSurfaceConfig,
    ) -> Result<Self, GraphicsError> {
        if config.max_vertices == 0 || config.max_vertices % 3 != 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "vertex capacity {} is not a positive multiple of 3",
                config.max_vertices
            )));
        }
        let params = allocator.create_buffer(
            &BufferDescriptor::uniform(std::mem::size_of::<MeshUniforms>() as u64)
                .with_label("isosurface_params"),
        )?;
        let vertices = allocator.create_buffer(
            &BufferDescriptor::new(
                u64::from(config.max_vertices) * MeshVertex::SIZE,
                BufferUsage::VERTEX | BufferUsage::STORAGE,
            )
            .with_label("isosurface_vertices"),
        )?;
        let args = allocator.create_buffer(
            &BufferDescriptor::new(
                DrawIndirectArgs::SIZE,
                BufferUsage::INDIRECT | BufferUsage::STORAGE | BufferUsage::COPY_DST,
            )
            .with_label("isosurface_args"),
        )?;
        let buffers = MeshBuffers {
            params,
            vertices,
            args,
        };
        let isolevel = Arc::new(Mutex::new(config.isolevel));
        let cache = build_tasks(
            allocator,
            program,
            source,
            buffers,
            config.max_vertices,
            &isolevel,
        )?;
        log::debug!(
            "IsoSurfaceMesh: meshing {} at isolevel {}",
            source.texture,
            config.isolevel
        );
        Ok(Self {
            program,
            source,
            max_vertices: config.max_vertices,
            buffers,
            isolevel,
            cache,
        })
    }

    /// Field being meshed.
    pub fn source(&self) -> FieldSource {
        self.source
    }

    /// Buffer of generated [`MeshVertex`] values.
    pub fn vertex_buffer(&self) -> BufferId {
        self.buffers.vertices
    }

    /// Buffer of [`DrawIndirectArgs`] drawing the generated vertices.
    pub fn args_buffer(&self) -> BufferId {
        self.buffers.args
    }

    /// Uniform buffer holding [`MeshUniforms`].
    pub fn params_buffer(&self) -> BufferId {
        self.buffers.params
    }

    /// Vertex buffer capacity.
    pub fn max_vertices(&self) -> u32 {
        self.max_vertices
    }

    /// Current isolevel.
    pub fn isolevel(&self) -> f32 {
        *self.isolevel.lock()
    }

    /// Change the isolevel. Marks the mesh dirty if it differs.
    pub fn set_isolevel(&self, isolevel: f32) {
        let mut current = self.isolevel.lock();
        if *current != isolevel {
            *current = isolevel;
            self.cache.mark_dirty();
        }
    }

    /// Mesh a different field.
    ///
    /// The command buffer binds the field, so it is re-recorded together
    /// with both cached tasks.
    pub fn set_source(
        &mut self,
        allocator: &mut dyn ResourceAllocator,
        source: FieldSource,
    ) -> Result<(), GraphicsError> {
        if source == self.source {
            return Ok(());
        }
        let cache = build_tasks(
            allocator,
            self.program,
            source,
            self.buffers,
            self.max_vertices,
            &self.isolevel,
        )?;
        log::debug!(
            "IsoSurfaceMesh: source {} -> {}",
            self.source.texture,
            source.texture
        );
        self.source = source;
        self.cache = cache;
        Ok(())
    }
}

impl TaskProducer for IsoSurfaceMesh {
    fn name(&self) -> &str {
        "isosurface"
    }

    fn cache(&self) -> &CachedTaskPair {
        &self.cache
    }
}

impl std::fmt::Debug for IsoSurfaceMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsoSurfaceMesh")
            .field("source", &self.source)
            .field("isolevel", &self.isolevel())
            .field("max_vertices", &self.max_vertices)
            .field("cache", &self.cache)
            .finish()
    }
}

fn build_tasks(
    allocator: &mut dyn ResourceAllocator,
    program: ProgramId,
    source: FieldSource,
    buffers: MeshBuffers,
    max_vertices: u32,
    isolevel: &Arc<Mutex<f32>>,
) -> Result<CachedTaskPair, GraphicsError> {
    let MeshBuffers {
        params,
        vertices,
        args,
    } = buffers;
    let isolevel = Arc::clone(isolevel);
    let upload = PresentTask::cpu("isosurface_upload", [], [params.into()], move |ctx| {
        let uniforms = MeshUniforms::new(*isolevel.lock(), source.resolution, max_vertices);
        ctx.write_pod(params, 0, &uniforms)
    })?;

    let mut cmd = CommandBuffer::new(CommandBufferDescriptor::compute().with_label("marching_cubes"));
    let mut rec = cmd.start_recording(allocator.registry(), None)?;
    rec.fill_buffer(args, 0, DrawIndirectArgs::SIZE, 0)?;
    rec.set_program(program)?;
    rec.set_bindings(&[
        Binding::new("params", BoundResource::buffer(params)),
        Binding::new("field", BoundResource::Texture(source.texture)),
        Binding::new("vertices", BoundResource::buffer(vertices)),
        Binding::new("args", BoundResource::buffer(args)),
    ])?;
    let groups = source.resolution.saturating_sub(1).div_ceil(WORKGROUP_SIZE);
    rec.dispatch(groups, groups, groups)?;
    rec.finish();
    let compute = PresentTask::gpu(
        "marching_cubes",
        Arc::new(cmd),
        [params.into(), source.texture.into()],
        [vertices.into(), args.into()],
    )?;

    let mut group = TaskGroupBuilder::new("isosurface");
    let upload = group.add_member(upload);
    let compute = group.add_member(compute);
    group.connect(upload, 0, compute, 0);
    group.expose_input(source.texture, compute, 1);
    group.expose_output(vertices, compute, 0);
    group.expose_output(args, compute, 1);
    let full = group.build()?;
    let cached = PresentTask::pass_through_for("isosurface_cached", &full)?;
    CachedTaskPair::new(full, cached)
}

struct Grid<'a> {
    values: &'a [f32],
    n: u32,
}

impl Grid<'_> {
    fn value(&self, x: u32, y: u32, z: u32) -> f32 {
        self.values[((z * self.n + y) * self.n + x) as usize]
    }

    fn position(&self, x: u32, y: u32, z: u32) -> Vec3 {
        Vec3::new(
            grid_coord(x, self.n),
            grid_coord(y, self.n),
            grid_coord(z, self.n),
        )
    }

    /// Central-difference gradient, one-sided on the border.
    fn gradient(&self, x: u32, y: u32, z: u32) -> Vec3 {
        let last = self.n - 1;
        let axis = |lo: f32, hi: f32, i: u32| {
            let span = if i == 0 || i == last { 1.0 } else { 2.0 };
            (hi - lo) / span
        };
        Vec3::new(
            axis(
                self.value(x.saturating_sub(1), y, z),
                self.value((x + 1).min(last), y, z),
                x,
            ),
            axis(
                self.value(x, y.saturating_sub(1), z),
                self.value(x, (y + 1).min(last), z),
                y,
            ),
            axis(
                self.value(x, y, z.saturating_sub(1)),
                self.value(x, y, (z + 1).min(last)),
                z,
            ),
        )
    }
}

#[derive(Clone, Copy)]
struct Corner {
    position: Vec3,
    value: f32,
    gradient: Vec3,
}

struct MeshBuilder {
    vertices: Vec<MeshVertex>,
    capacity: usize,
    dropped: usize,
}

impl MeshBuilder {
    fn new(capacity: u32) -> Self {
        Self {
            vertices: Vec::new(),
            capacity: capacity as usize,
            dropped: 0,
        }
    }

    /// Emit a triangle wound counter-clockwise when seen from outside.
    fn triangle(&mut self, mut points: [(Vec3, Vec3); 3]) {
        if self.vertices.len() + 3 > self.capacity {
            self.dropped += 1;
            return;
        }
        let [a, b, c] = points;
        let face = (b.0 - a.0).cross(c.0 - a.0);
        let outward = a.1 + b.1 + c.1;
        if face.dot(outward) < 0.0 {
            points.swap(1, 2);
        }
        for (position, normal) in points {
            self.vertices.push(MeshVertex {
                position: position.to_array(),
                normal: normal.to_array(),
            });
        }
    }
}

fn polygonize_cell(grid: &Grid<'_>, cell: [u32; 3], isolevel: f32, mesh: &mut MeshBuilder) {
    let corners: [Corner; 8] = std::array::from_fn(|c| {
        let x = cell[0] + (c as u32 & 1);
        let y = cell[1] + ((c as u32 >> 1) & 1);
        let z = cell[2] + ((c as u32 >> 2) & 1);
        Corner {
            position: grid.position(x, y, z),
            value: grid.value(x, y, z),
            gradient: grid.gradient(x, y, z),
        }
    });
    for tetrahedron in CUBE_TETRAHEDRA {
        polygonize_tetrahedron(tetrahedron.map(|c| corners[c]), isolevel, mesh);
    }
}

fn polygonize_tetrahedron(corners: [Corner; 4], isolevel: f32, mesh: &mut MeshBuilder) {
    let (inside, outside): (Vec<Corner>, Vec<Corner>) =
        corners.into_iter().partition(|c| c.value >= isolevel);
    let edge = |a: Corner, b: Corner| crossing(a, b, isolevel);
    match (inside.as_slice(), outside.as_slice()) {
        ([a], [b, c, d]) | ([b, c, d], [a]) => {
            mesh.triangle([edge(*a, *b), edge(*a, *c), edge(*a, *d)]);
        }
        ([a, b], [c, d]) => {
            let (ac, ad, bc, bd) = (edge(*a, *c), edge(*a, *d), edge(*b, *c), edge(*b, *d));
            mesh.triangle([ac, ad, bd]);
            mesh.triangle([ac, bd, bc]);
        }
        _ => {}
    }
}

/// Point where the field crosses `isolevel` on edge `a`-`b`, with its
/// outward normal.
fn crossing(a: Corner, b: Corner, isolevel: f32) -> (Vec3, Vec3) {
    let delta = b.value - a.value;
    let t = if delta.abs() < f32::EPSILON {
        0.5
    } else {
        ((isolevel - a.value) / delta).clamp(0.0, 1.0)
    };
    let position = a.position.lerp(b.position, t);
    let normal = (-a.gradient.lerp(b.gradient, t)).try_normalize().unwrap_or(Vec3::Y);
    (position, normal)
}

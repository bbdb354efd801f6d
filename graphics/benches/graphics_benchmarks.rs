use criterion::{Criterion, black_box, criterion_group, criterion_main};

use glam::Vec3;
use thistle_graphics::producers::{IsoSurfaceConfig, IsoSurfaceMesh, Metaball, MetaballField};
use thistle_graphics::{
    BufferDescriptor, BufferId, PresentTask, PresentTaskRunner, ResourceAllocator, SharedTask,
    SoftwareBackend, TaskGroupBuilder, TaskIo, TaskProducer,
};

// ---------------------------------------------------------------------------
// Task group construction
// ---------------------------------------------------------------------------

fn chain_buffers(backend: &mut SoftwareBackend, len: usize) -> Vec<BufferId> {
    (0..=len)
        .map(|_| {
            backend
                .create_buffer(&BufferDescriptor::uniform(16))
                .expect("buffer allocates")
        })
        .collect()
}

fn chain_members(buffers: &[BufferId]) -> Vec<SharedTask> {
    buffers
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            let (src, dst) = (pair[0], pair[1]);
            PresentTask::cpu(
                format!("stage_{i}"),
                [TaskIo::from(src)],
                [TaskIo::from(dst)],
                move |ctx| {
                    let mut value = [0u8; 16];
                    ctx.read_buffer(src, 0, &mut value)?;
                    ctx.write_buffer(dst, 0, &value)
                },
            )
            .expect("task builds")
        })
        .collect()
}

fn build_chain(buffers: &[BufferId], members: &[SharedTask]) -> SharedTask {
    let mut builder = TaskGroupBuilder::new("chain");
    for member in members {
        builder.add_member(member.clone());
    }
    for i in 1..members.len() {
        builder.connect(i - 1, 0, i, 0);
    }
    builder.expose_input(buffers[0], 0, 0);
    builder.expose_output(buffers[members.len()], members.len() - 1, 0);
    builder.build().expect("chain is valid")
}

fn bench_group_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("task_group_build");
    for len in [4usize, 32, 128] {
        let mut backend = SoftwareBackend::new();
        let buffers = chain_buffers(&mut backend, len);
        let members = chain_members(&buffers);
        group.bench_function(format!("chain_{len}"), |b| {
            b.iter(|| black_box(build_chain(&buffers, &members)));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Frame execution
// ---------------------------------------------------------------------------

fn bench_run_chain(c: &mut Criterion) {
    c.bench_function("run_cpu_chain_32", |b| {
        let mut backend = SoftwareBackend::new();
        let buffers = chain_buffers(&mut backend, 32);
        let members = chain_members(&buffers);
        let task = build_chain(&buffers, &members);
        let mut runner = PresentTaskRunner::new();
        b.iter(|| {
            black_box(
                runner
                    .run(task.clone(), &mut backend)
                    .expect("frame runs"),
            )
        });
    });
}

fn metaball_pipeline(resolution: u32) -> (SoftwareBackend, MetaballField, IsoSurfaceMesh) {
    let mut backend = SoftwareBackend::new();
    let field_program = backend
        .create_kernel(&MetaballField::program_descriptor(), MetaballField::evaluate)
        .expect("field program registers");
    let mesh_program = backend
        .create_kernel(&IsoSurfaceMesh::program_descriptor(), IsoSurfaceMesh::polygonize)
        .expect("mesh program registers");
    let field = MetaballField::new(&mut backend, field_program, resolution).expect("field builds");
    field
        .set_metaballs(vec![
            Metaball::new(Vec3::new(-0.3, 0.1, 0.0), 0.3),
            Metaball::new(Vec3::new(0.3, -0.1, 0.0), 0.3),
            Metaball::new(Vec3::new(0.0, 0.0, 0.3), 0.25),
        ])
        .expect("metaballs fit");
    let mesh = IsoSurfaceMesh::new(
        &mut backend,
        mesh_program,
        field.source(),
        IsoSurfaceConfig::default(),
    )
    .expect("mesh builds");
    (backend, field, mesh)
}

fn pipeline_frame(field: &MetaballField, mesh: &IsoSurfaceMesh) -> SharedTask {
    let mut builder = TaskGroupBuilder::new("frame");
    let f = builder.add_member(field.present_task());
    let m = builder.add_member(mesh.present_task());
    builder.connect(f, 0, m, 0);
    builder.expose_output(mesh.vertex_buffer(), m, 0);
    builder.build().expect("frame is valid")
}

fn bench_metaball_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("metaball_frame");

    group.bench_function("recompute_24", |b| {
        let (mut backend, field, mesh) = metaball_pipeline(24);
        let mut runner = PresentTaskRunner::new();
        b.iter(|| {
            field.mark_dirty();
            mesh.mark_dirty();
            let task = pipeline_frame(&field, &mesh);
            black_box(runner.run(task, &mut backend).expect("frame runs"))
        });
    });

    group.bench_function("cached_24", |b| {
        let (mut backend, field, mesh) = metaball_pipeline(24);
        let mut runner = PresentTaskRunner::new();
        runner
            .run(pipeline_frame(&field, &mesh), &mut backend)
            .expect("first frame runs");
        b.iter(|| {
            let task = pipeline_frame(&field, &mesh);
            black_box(runner.run(task, &mut backend).expect("frame runs"))
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_group_build,
    bench_run_chain,
    bench_metaball_frames
);
criterion_main!(benches);

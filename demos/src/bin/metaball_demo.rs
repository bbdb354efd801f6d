//! Metaball Demo
//!
//! Animates a handful of metaballs and, every frame, composes three
//! producers into one frame task:
//! - the metaball field (compute)
//! - the marching-cubes mesh built from the field (compute, connected to the
//!   field)
//! - a control overlay with one bar per metaball (raster)
//!
//! Producers whose state did not change contribute pass-through tasks, so a
//! still scene costs no submissions after the first frame.
//!
//! Usage:
//!   cargo run --bin metaball_demo -- --frames 240 --resolution 32
//!   cargo run --bin metaball_demo -- --still

use clap::Parser;

use thistle_graphics::producers::{
    ControlRasterizer, ControlRasterizerConfig, IsoSurfaceConfig, IsoSurfaceMesh, Metaball,
    MetaballField, MAX_METABALLS,
};
use thistle_graphics::types::DrawIndirectArgs;
use thistle_graphics::{
    GraphicsError, PresentTaskRunner, RunnerConfig, SharedTask, SoftwareBackend, TaskGroupBuilder,
    TaskProducer,
};

use thistle_demos::{height_bars, orbiting_metaball, FRAME_TIME};

/// Overlay size in pixels.
const OVERLAY_WIDTH: u32 = 128;
const OVERLAY_HEIGHT: u32 = 64;

/// Frames between progress reports.
const REPORT_INTERVAL: u64 = 30;

/// Run the metaball frame loop on the software backend.
#[derive(Debug, Parser)]
#[command(name = "metaball_demo", version, about)]
struct Args {
    /// Number of frames to run.
    #[arg(long, default_value_t = 120)]
    frames: u64,

    /// Field samples per axis.
    #[arg(long, default_value_t = 24, value_parser = clap::value_parser!(u32).range(2..=128))]
    resolution: u32,

    /// Field value at which the surface is extracted.
    #[arg(long, default_value_t = 1.0)]
    isolevel: f32,

    /// Number of metaballs.
    #[arg(long, default_value_t = 4)]
    metaballs: usize,

    /// Keep the scene still after the first frame.
    #[arg(long)]
    still: bool,

    /// Wait for the backend at the end of every frame.
    #[arg(long)]
    frame_end_wait: bool,
}

struct Scene {
    field: MetaballField,
    mesh: IsoSurfaceMesh,
    overlay: ControlRasterizer,
    count: usize,
}

impl Scene {
    fn new(backend: &mut SoftwareBackend, args: &Args) -> Result<Self, GraphicsError> {
        let field_program =
            backend.create_kernel(&MetaballField::program_descriptor(), MetaballField::evaluate)?;
        let mesh_program = backend
            .create_kernel(&IsoSurfaceMesh::program_descriptor(), IsoSurfaceMesh::polygonize)?;
        let overlay_program = backend.create_kernel(
            &ControlRasterizer::program_descriptor(),
            ControlRasterizer::rasterize,
        )?;

        let field = MetaballField::new(backend, field_program, args.resolution)?;
        let mesh = IsoSurfaceMesh::new(
            backend,
            mesh_program,
            field.source(),
            IsoSurfaceConfig::default().with_isolevel(args.isolevel),
        )?;
        let overlay = ControlRasterizer::new(
            backend,
            overlay_program,
            ControlRasterizerConfig::default()
                .with_size(OVERLAY_WIDTH, OVERLAY_HEIGHT)
                .with_max_controls(MAX_METABALLS as u32),
        )?;

        Ok(Self {
            field,
            mesh,
            overlay,
            count: args.metaballs,
        })
    }

    /// Move the metaballs to their positions at `time`.
    fn animate(&self, time: f32) -> Result<(), GraphicsError> {
        let balls: Vec<Metaball> = (0..self.count)
            .map(|i| orbiting_metaball(i, self.count, time))
            .collect();
        self.overlay
            .set_controls(height_bars(&balls, OVERLAY_WIDTH, OVERLAY_HEIGHT))?;
        self.field.set_metaballs(balls)?;
        if self.field.is_dirty() {
            self.mesh.mark_dirty();
        }
        Ok(())
    }

    /// Compose this frame's task tree.
    fn frame_task(&self) -> Result<SharedTask, GraphicsError> {
        let mut builder = TaskGroupBuilder::new("frame");
        let field = builder.add_member(self.field.present_task());
        let mesh = builder.add_member(self.mesh.present_task());
        let overlay = builder.add_member(self.overlay.present_task());
        builder.connect(field, 0, mesh, 0);
        builder.expose_output(self.mesh.vertex_buffer(), mesh, 0);
        builder.expose_output(self.mesh.args_buffer(), mesh, 1);
        builder.expose_output(self.overlay.target_texture(), overlay, 0);
        Ok(builder.build()?)
    }
}

fn run(args: &Args) -> Result<(), GraphicsError> {
    if args.metaballs == 0 || args.metaballs > MAX_METABALLS {
        return Err(GraphicsError::InvalidParameter(format!(
            "metaball count must be in 1..={MAX_METABALLS}, got {}",
            args.metaballs
        )));
    }

    let mut backend = SoftwareBackend::new();
    let scene = Scene::new(&mut backend, args)?;

    let mut config = RunnerConfig::default();
    if args.frame_end_wait {
        config = config.with_frame_end_wait();
    }
    let mut runner = PresentTaskRunner::with_config(config);

    let mut submissions = 0;
    let mut skipped = 0;
    for frame in 0..args.frames {
        thistle_core::profile_scope!("frame");
        if frame == 0 || !args.still {
            scene.animate(frame as f32 * FRAME_TIME)?;
        }

        let report = runner.run(scene.frame_task()?, &mut backend)?;
        submissions += report.submissions();
        skipped += report.skipped.len();
        log::debug!(
            "Frame {}: executed {:?}, skipped {:?}, {} waits",
            frame,
            report.executed_names(),
            report.skipped,
            report.waits
        );

        if (frame + 1) % REPORT_INTERVAL == 0 || frame + 1 == args.frames {
            let args_data = backend.buffer_data(scene.mesh.args_buffer())?;
            let draw: DrawIndirectArgs = bytemuck::pod_read_unaligned(args_data);
            log::info!(
                "Frame {}: {} triangles, {} submissions so far",
                frame + 1,
                draw.vertex_count / 3,
                submissions
            );
        }
    }

    let stats = backend.stats();
    log::info!(
        "Done: {} frames, {} submissions ({} dispatches, {} draws), {} pass-through tasks skipped, {} KiB in use",
        runner.frames(),
        stats.submissions,
        stats.dispatches,
        stats.draws,
        skipped,
        backend.memory_used() / 1024
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting Thistle Metaball Demo");
    log::info!("Core version: {}", thistle_core::VERSION);
    log::info!("Graphics version: {}", thistle_graphics::VERSION);

    thistle_core::init();
    thistle_graphics::init();

    let args = Args::parse();
    if let Err(err) = run(&args) {
        log::error!("Metaball demo failed: {}", err);
        std::process::exit(1);
    }
}

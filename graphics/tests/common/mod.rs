//! Common utilities for present-graph integration tests.
//!
//! Wraps a [`SoftwareBackend`] so tests can observe the order in which CPU
//! callbacks, submissions and waits happen.

use std::sync::Arc;

use parking_lot::Mutex;
use thistle_graphics::backend::KernelContext;
use thistle_graphics::command::{Binding, BoundResource};
use thistle_graphics::resources::{BindingKind, ProgramDescriptor, ProgramLayout};
use thistle_graphics::{
    Backend, BufferDescriptor, BufferId, CommandBuffer, CommandBufferDescriptor, GraphicsError,
    HostAccess, ProgramId, QueueFlags, ResourceAllocator, SharedTask, SoftwareBackend,
    TextureDescriptor, TextureFormat, TextureId, TextureUsage, TextureViewId,
};

/// Shared, ordered log of everything that happened during a run.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Software backend that logs submissions and waits.
pub struct TracingBackend {
    /// Wrapped backend.
    pub inner: SoftwareBackend,
    /// Event log, shared with CPU callbacks.
    pub events: EventLog,
}

impl Backend for TracingBackend {
    fn name(&self) -> &str {
        "Tracing"
    }

    fn submit(&mut self, command_buffer: &CommandBuffer, queue: QueueFlags) -> Result<(), GraphicsError> {
        self.events
            .lock()
            .push(format!("submit {}", command_buffer.label().unwrap_or("?")));
        self.inner.submit(command_buffer, queue)
    }

    fn wait_idle(&mut self) -> Result<(), GraphicsError> {
        self.events.lock().push("wait".to_string());
        self.inner.wait_idle()
    }

    fn host_access(&mut self) -> &mut dyn HostAccess {
        self.inner.host_access()
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// Backend, event log and the "tint" program used by most tests.
pub struct TestContext {
    /// Backend under test.
    pub backend: TracingBackend,
    /// Fills an `Rgba32Float` image with the color in its uniform.
    pub tint: ProgramId,
}

impl TestContext {
    /// Create a context with the tint program registered.
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut inner = SoftwareBackend::new();
        let tint = inner
            .create_kernel(&tint_descriptor(), tint_kernel)
            .expect("tint program registers");
        Self {
            backend: TracingBackend {
                inner,
                events: EventLog::default(),
            },
            tint,
        }
    }

    /// Allocator of the wrapped backend.
    pub fn allocator(&mut self) -> &mut dyn ResourceAllocator {
        &mut self.backend.inner
    }

    /// A 16-byte uniform buffer for one RGBA color.
    pub fn color_uniform(&mut self) -> BufferId {
        self.allocator()
            .create_buffer(&BufferDescriptor::uniform(16).with_label("color"))
            .expect("uniform allocates")
    }

    /// A square `Rgba32Float` storage texture and its view.
    pub fn storage_texture(&mut self, size: u32) -> (TextureId, TextureViewId) {
        let texture = self
            .allocator()
            .create_texture(&TextureDescriptor::new_2d(
                size,
                size,
                TextureFormat::Rgba32Float,
                TextureUsage::STORAGE_BINDING | TextureUsage::COPY_SRC,
            ))
            .expect("texture allocates");
        let view = self
            .allocator()
            .create_texture_view(texture, 0)
            .expect("view allocates");
        (texture, view)
    }

    /// A recorded compute buffer dispatching the tint program.
    pub fn tint_buffer(&mut self, label: &str, color: BufferId, view: TextureViewId) -> Arc<CommandBuffer> {
        let mut cmd = CommandBuffer::new(CommandBufferDescriptor::compute().with_label(label));
        let mut rec = cmd
            .start_recording(self.backend.inner.registry(), None)
            .expect("recording starts");
        rec.set_program(self.tint).expect("program binds");
        rec.set_bindings(&[
            Binding::new("color", BoundResource::buffer(color)),
            Binding::new("target", BoundResource::Image(view)),
        ])
        .expect("bindings match layout");
        rec.dispatch(1, 1, 1).expect("dispatch records");
        rec.finish();
        Arc::new(cmd)
    }

    /// Texels of `texture` as floats.
    pub fn texels(&self, texture: TextureId) -> Vec<f32> {
        let data = self
            .backend
            .inner
            .texture_data(texture, 0)
            .expect("texture is live");
        bytemuck::pod_collect_to_vec(data)
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<String> {
        self.backend.events.lock().clone()
    }
}

/// Descriptor of the tint program.
pub fn tint_descriptor() -> ProgramDescriptor {
    ProgramDescriptor::compute().with_label("tint").with_layout(
        ProgramLayout::new()
            .with_binding("color", 0, BindingKind::Buffer)
            .with_binding("target", 1, BindingKind::Image),
    )
}

fn tint_kernel(ctx: &mut KernelContext<'_>) -> Result<(), GraphicsError> {
    let color: [f32; 4] = ctx.read_pod("color")?;
    let (extent, _) = ctx.image_info("target")?;
    let texels: Vec<[f32; 4]> = vec![color; extent.texel_count()];
    ctx.write_image("target", bytemuck::cast_slice(&texels))
}

/// Strong count of a shared task.
pub fn strong(task: &SharedTask) -> usize {
    Arc::strong_count(task)
}

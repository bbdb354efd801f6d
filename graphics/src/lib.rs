//! # Thistle Graphics
//!
//! Present-task graph for Thistle: how producers describe deferred frame
//! work and how a frame runner executes it.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`CommandBuffer`] - Replayable sequence of GPU operations, recorded
//!   through a [`Recorder`] session
//! - [`PresentTask`] - CPU callback, GPU submission, or a [`TaskGroup`] of
//!   other tasks, with declared resource inputs and outputs
//! - [`CachedTaskPair`] - Full-recompute and pass-through tasks selected per
//!   frame by a dirty flag
//! - [`PresentTaskRunner`] - Executes a task tree in dependency order
//!   against a [`Backend`]
//! - [`SoftwareBackend`] - CPU interpreter of recorded command buffers
//! - [`producers`] - Metaball field, marching-cubes iso-surface and UI
//!   control rasterizer
//!
//! ## Example
//!
//! ```ignore
//! use thistle_graphics::{PresentTaskRunner, SoftwareBackend, TaskProducer};
//! use thistle_graphics::producers::MetaballField;
//!
//! let mut backend = SoftwareBackend::new();
//! let program = backend.create_kernel(
//!     &MetaballField::program_descriptor(),
//!     MetaballField::evaluate,
//! )?;
//! let field = MetaballField::new(&mut backend, program, 32)?;
//!
//! let mut runner = PresentTaskRunner::new();
//! runner.run(field.present_task(), &mut backend)?;
//! ```

pub mod backend;
pub mod command;
pub mod error;
pub mod producers;
pub mod resources;
pub mod runner;
pub mod task;
pub mod types;

// Re-export main types for convenience
pub use backend::{Backend, HostAccess, SoftwareBackend, SoftwareBackendConfig};
pub use command::{
    CommandBuffer, CommandBufferDescriptor, CommandBufferPool, CommandError, QueueFlags, Recorder,
};
pub use error::GraphicsError;
pub use producers::{CachedTaskPair, TaskProducer};
pub use resources::{
    BufferId, FramebufferId, ProgramId, ResourceAllocator, ResourceRegistry, TextureId,
    TextureViewId,
};
pub use runner::{PresentTaskRunner, RunReport, RunnerConfig};
pub use task::{
    GroupError, PresentTask, SharedTask, TaskError, TaskGroup, TaskGroupBuilder, TaskIo,
};
pub use types::{
    BufferDescriptor, BufferUsage, ClearValue, Extent3d, TextureDescriptor, TextureFormat,
    TextureUsage,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version.
///
/// Call once at startup, after the logger is installed.
pub fn init() {
    log::info!("Thistle Graphics v{} initialized", VERSION);
}

//! Execution backends.
//!
//! A backend receives recorded command buffers from the frame runner and
//! owns the memory behind every resource handle. The graph itself never
//! touches resource storage; CPU tasks reach it through [`HostAccess`].
//!
//! # Available Backends
//!
//! - [`software`]: CPU interpreter of recorded command buffers, with Rust
//!   closures registered as programs. Used by tests and the demos.

pub mod software;

pub use software::{
    BackendStats, DispatchInvocation, Kernel, KernelContext, SoftwareBackend,
    SoftwareBackendConfig,
};

use crate::command::{CommandBuffer, QueueFlags};
use crate::error::GraphicsError;
use crate::resources::{BufferId, TextureId};

/// Host-side access to resource memory.
pub trait HostAccess {
    /// Copy bytes of `buffer` starting at `offset` into `dst`.
    fn read_buffer(&self, buffer: BufferId, offset: u64, dst: &mut [u8])
        -> Result<(), GraphicsError>;

    /// Overwrite bytes of `buffer` starting at `offset`.
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8])
        -> Result<(), GraphicsError>;

    /// Copy the texels of one mip level into `dst`, which must match the
    /// level's byte size.
    fn read_texture(
        &self,
        texture: TextureId,
        mip_level: u32,
        dst: &mut [u8],
    ) -> Result<(), GraphicsError>;

    /// Overwrite the texels of one mip level.
    fn write_texture(
        &mut self,
        texture: TextureId,
        mip_level: u32,
        data: &[u8],
    ) -> Result<(), GraphicsError>;
}

/// Something that can execute recorded command buffers.
///
/// How `wait_idle` is implemented (fence, semaphore, timeline value, or
/// nothing) is up to the backend. The runner only relies on it returning
/// after every prior submission has completed.
pub trait Backend {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Execute `command_buffer` on `queue`.
    fn submit(&mut self, command_buffer: &CommandBuffer, queue: QueueFlags)
        -> Result<(), GraphicsError>;

    /// Block until all submitted work has completed.
    fn wait_idle(&mut self) -> Result<(), GraphicsError>;

    /// Host access to resource memory, handed to CPU tasks.
    fn host_access(&mut self) -> &mut dyn HostAccess;
}

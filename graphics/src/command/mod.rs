//! Command buffer recording.
//!
//! A [`CommandBuffer`] holds a replayable list of GPU operations. Recording
//! happens through a [`Recorder`], obtained from
//! [`CommandBuffer::start_recording`]. The recorder mutably borrows the
//! buffer for the whole session, so there is no way to record into a buffer
//! without an open session, and no way to open a second session while one
//! is running.
//!
//! # Example
//!
//! ```ignore
//! let mut cmd = CommandBuffer::new(CommandBufferDescriptor::compute().with_label("field"));
//! let mut rec = cmd.start_recording(registry, None)?;
//! rec.set_program(kernel)?;
//! rec.set_bindings(&[
//!     Binding::new("params", BoundResource::buffer(params)),
//!     Binding::new("field", BoundResource::Image(field_view)),
//! ])?;
//! rec.dispatch(8, 8, 8)?;
//! rec.finish();
//! ```

mod buffer;
mod ops;
mod pool;
mod recorder;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use thiserror::Error;

use crate::resources::{BindingKind, BindingSlot, ProgramKind};

pub use buffer::{CommandBuffer, RecordingState};
pub use ops::{
    AttachmentLoad, Binding, BlendState, BoundResource, Command, CullMode, DrawCall,
    GraphicsState, RasterState, TextureCopyRegion,
};
pub use pool::CommandBufferPool;
pub use recorder::Recorder;

bitflags! {
    /// Queues a command buffer may be submitted to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueFlags: u32 {
        /// Graphics queue (draws, framebuffer work).
        const GRAPHICS = 1 << 0;
        /// Compute queue (dispatches, fills, copies).
        const COMPUTE = 1 << 1;
    }
}

/// Process-unique identity of a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandBufferId(u64);

impl CommandBufferId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CommandBufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

/// Creation parameters of a command buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandBufferDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Queues the buffer may be submitted to.
    pub queues: QueueFlags,
    /// Whether other buffers may execute this one inline.
    pub invokable: bool,
    /// Whether the buffer may be recorded more than once.
    pub resettable: bool,
}

impl Default for CommandBufferDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            queues: QueueFlags::GRAPHICS | QueueFlags::COMPUTE,
            invokable: false,
            resettable: true,
        }
    }
}

impl CommandBufferDescriptor {
    /// Descriptor for a buffer usable on any queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor for a compute-only buffer.
    pub fn compute() -> Self {
        Self {
            queues: QueueFlags::COMPUTE,
            ..Self::default()
        }
    }

    /// Descriptor for a graphics-only buffer.
    pub fn graphics() -> Self {
        Self {
            queues: QueueFlags::GRAPHICS,
            ..Self::default()
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the compatible queues.
    pub fn with_queues(mut self, queues: QueueFlags) -> Self {
        self.queues = queues;
        self
    }

    /// Allow other buffers to execute this one.
    pub fn invokable(mut self) -> Self {
        self.invokable = true;
        self
    }

    /// Forbid recording more than once.
    pub fn one_shot(mut self) -> Self {
        self.resettable = false;
        self
    }
}

/// A named marker emitted while recording one buffer and waited on by
/// another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncPoint {
    name: Arc<str>,
    source: CommandBufferId,
    serial: u32,
}

impl SyncPoint {
    /// Marker name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buffer that signals this point.
    pub fn source(&self) -> CommandBufferId {
        self.source
    }
}

impl std::fmt::Display for SyncPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}#{}", self.name, self.source, self.serial)
    }
}

/// Reasons a recording call is rejected. A rejected call never changes the
/// buffer or the open session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The buffer is not resettable and was already recorded.
    #[error("command buffer was already recorded and is not resettable")]
    AlreadyRecorded,
    /// A handle did not resolve in the registry.
    #[error("invalid resource: {0}")]
    InvalidResource(String),
    /// A dispatch or draw was recorded with no program set.
    #[error("no program set")]
    NoProgram,
    /// The current program cannot run this operation.
    #[error("program kind {found:?} cannot be used here, expected {expected:?}")]
    ProgramKindMismatch {
        /// Kind the operation needs.
        expected: ProgramKind,
        /// Kind of the current program.
        found: ProgramKind,
    },
    /// The program layout declares no such slot.
    #[error("program declares no binding {0}")]
    UnknownBinding(BindingSlot),
    /// The bound resource kind does not match the declared slot kind.
    #[error("binding {slot} expects {expected:?}, got {found:?}")]
    BindingKindMismatch {
        /// Addressed slot.
        slot: BindingSlot,
        /// Declared kind.
        expected: BindingKind,
        /// Kind of the supplied resource.
        found: BindingKind,
    },
    /// A draw was recorded without a framebuffer bound.
    #[error("draw recorded without a framebuffer")]
    NoFramebuffer,
    /// Load policy count does not match the framebuffer's attachments.
    #[error("framebuffer has {attachments} attachments but {policies} load policies were given")]
    LoadPolicyCountMismatch {
        /// Attachments of the framebuffer.
        attachments: usize,
        /// Supplied policies.
        policies: usize,
    },
    /// A byte range or texel region does not fit its resource.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),
    /// Offsets and sizes of fills must be multiples of four bytes.
    #[error("misaligned fill: offset {offset}, size {size}")]
    MisalignedFill {
        /// Requested offset.
        offset: u64,
        /// Requested size.
        size: u64,
    },
    /// Resource usage flags forbid the operation.
    #[error("resource usage does not allow this operation: {0}")]
    InvalidUsage(String),
    /// The nested buffer was not created invokable.
    #[error("nested command buffer is not invokable")]
    NotInvokable,
    /// The nested buffer has not finished recording.
    #[error("nested command buffer is not recorded")]
    NotRecorded,
    /// A buffer cannot execute itself.
    #[error("command buffer cannot execute itself")]
    SelfExecution,
    /// The nested buffer cannot run on every queue the parent can.
    #[error("nested command buffer supports {nested:?}, parent requires {parent:?}")]
    IncompatibleQueues {
        /// Queues of the recording buffer.
        parent: QueueFlags,
        /// Queues of the nested buffer.
        nested: QueueFlags,
    },
    /// Waiting on a sync point emitted by the same buffer.
    #[error("sync point {0} belongs to the recording buffer")]
    WaitOnOwnSyncPoint(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults() {
        let desc = CommandBufferDescriptor::new();
        assert!(desc.queues.contains(QueueFlags::GRAPHICS | QueueFlags::COMPUTE));
        assert!(desc.resettable);
        assert!(!desc.invokable);

        let desc = CommandBufferDescriptor::compute().invokable().one_shot();
        assert_eq!(desc.queues, QueueFlags::COMPUTE);
        assert!(desc.invokable);
        assert!(!desc.resettable);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = CommandBufferId::next();
        let b = CommandBufferId::next();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }
}

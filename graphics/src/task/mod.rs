//! Present tasks.
//!
//! A present task is a unit of deferred frame work with declared resource
//! inputs and outputs. It is one of:
//!
//! | Variant | Wraps | Runs as |
//! |---------|-------|---------|
//! | [`PresentTask::Cpu`] | a callback | a synchronous call on the runner thread |
//! | [`PresentTask::Gpu`] | one recorded [`CommandBuffer`] | one queue submission |
//! | [`PresentTask::Group`] | other present tasks | its members in dependency order |
//!
//! Tasks are immutable once built and shared as [`SharedTask`]. A producer
//! typically keeps two of them around (see
//! [`CachedTaskPair`](crate::producers::CachedTaskPair)) and hands one to
//! the frame runner each frame.
//!
//! # Example
//!
//! ```ignore
//! let update = PresentTask::cpu("upload", [], [params.into()], move |ctx| {
//!     ctx.write_pod(params, 0, &uniforms)
//! })?;
//! let compute = PresentTask::gpu("compute", cmd, [params.into()], [field.into()])?;
//!
//! let mut group = TaskGroupBuilder::new("field");
//! let a = group.add_member(update);
//! let b = group.add_member(compute);
//! group.connect(a, 0, b, 0);
//! group.expose_output(field, b, 0);
//! let task = group.build()?;
//! ```

mod atomic;
mod group;
mod io;

use std::sync::Arc;

use thiserror::Error;

use crate::command::CommandBuffer;
use crate::error::GraphicsError;

pub use atomic::{CpuCallback, CpuTask, CpuTaskContext, GpuTask};
pub use group::{
    GroupError, GroupIoMapping, IngroupConnection, IoDirection, ReadHazard, TaskGroup,
    TaskGroupBuilder,
};
pub use io::{IoKind, TaskIo};

/// Reference-counted present task.
pub type SharedTask = Arc<PresentTask>;

/// Reasons an atomic task cannot be built or a CPU callback was refused
/// access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The wrapped command buffer has no finished recording.
    #[error("task '{task}' wraps a command buffer that is not recorded")]
    CommandBufferNotRecorded {
        /// Task name.
        task: String,
    },
    /// The same resource was listed twice as an input.
    #[error("task '{task}' lists input {resource} more than once")]
    DuplicateInput {
        /// Task name.
        task: String,
        /// Repeated resource.
        resource: String,
    },
    /// The same resource was listed twice as an output.
    #[error("task '{task}' lists output {resource} more than once")]
    DuplicateOutput {
        /// Task name.
        task: String,
        /// Repeated resource.
        resource: String,
    },
    /// A CPU callback touched a resource outside its declared IO.
    #[error("task '{task}' accessed undeclared resource {resource}")]
    UndeclaredAccess {
        /// Task name.
        task: String,
        /// Accessed resource.
        resource: String,
    },
}

/// Variant tag of a [`PresentTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// CPU callback.
    Cpu,
    /// Command buffer submission.
    Gpu,
    /// Composite of other tasks.
    Group,
}

/// A unit of deferred frame work.
#[derive(Debug)]
pub enum PresentTask {
    /// Runs a callback on the CPU.
    Cpu(CpuTask),
    /// Submits one command buffer.
    Gpu(GpuTask),
    /// Runs member tasks in dependency order.
    Group(TaskGroup),
}

static_assertions::assert_impl_all!(PresentTask: Send, Sync);
static_assertions::assert_impl_all!(CommandBuffer: Send, Sync);

impl PresentTask {
    /// Build a CPU task.
    pub fn cpu<F>(
        name: impl Into<String>,
        inputs: impl IntoIterator<Item = TaskIo>,
        outputs: impl IntoIterator<Item = TaskIo>,
        callback: F,
    ) -> Result<SharedTask, TaskError>
    where
        F: Fn(&mut CpuTaskContext<'_>) -> Result<(), GraphicsError> + Send + Sync + 'static,
    {
        let task = CpuTask::new(
            name.into(),
            inputs.into_iter().collect(),
            outputs.into_iter().collect(),
            Arc::new(callback),
        )?;
        log::debug!("Built CPU task '{}'", task.name);
        Ok(Arc::new(Self::Cpu(task)))
    }

    /// Build a GPU task around a recorded command buffer.
    pub fn gpu(
        name: impl Into<String>,
        command_buffer: Arc<CommandBuffer>,
        inputs: impl IntoIterator<Item = TaskIo>,
        outputs: impl IntoIterator<Item = TaskIo>,
    ) -> Result<SharedTask, TaskError> {
        let task = GpuTask::new(
            name.into(),
            command_buffer,
            inputs.into_iter().collect(),
            outputs.into_iter().collect(),
        )?;
        log::debug!(
            "Built GPU task '{}' ({} commands)",
            task.name,
            task.command_buffer().len()
        );
        Ok(Arc::new(Self::Gpu(task)))
    }

    /// Build a GPU task that does nothing and declares `outputs`.
    ///
    /// Consumers connected to it see the outputs as they were left by the
    /// last task that actually wrote them.
    pub fn pass_through(
        name: impl Into<String>,
        outputs: impl IntoIterator<Item = TaskIo>,
    ) -> Result<SharedTask, TaskError> {
        let task = GpuTask::pass_through(name.into(), Vec::new(), outputs.into_iter().collect())?;
        Ok(Arc::new(Self::Gpu(task)))
    }

    /// Build a pass-through declaring the same IO as `task`.
    ///
    /// Used as the cached stand-in for a task that has inputs, so groups
    /// connecting to it stay valid whichever of the two is returned.
    pub fn pass_through_for(
        name: impl Into<String>,
        task: &PresentTask,
    ) -> Result<SharedTask, TaskError> {
        let task = GpuTask::pass_through(
            name.into(),
            task.inputs().to_vec(),
            task.outputs().to_vec(),
        )?;
        Ok(Arc::new(Self::Gpu(task)))
    }

    /// Task name.
    pub fn name(&self) -> &str {
        match self {
            Self::Cpu(task) => &task.name,
            Self::Gpu(task) => &task.name,
            Self::Group(group) => group.name(),
        }
    }

    /// Declared inputs, in declaration order.
    pub fn inputs(&self) -> &[TaskIo] {
        match self {
            Self::Cpu(task) => &task.inputs,
            Self::Gpu(task) => &task.inputs,
            Self::Group(group) => group.inputs(),
        }
    }

    /// Declared outputs, in declaration order.
    pub fn outputs(&self) -> &[TaskIo] {
        match self {
            Self::Cpu(task) => &task.outputs,
            Self::Gpu(task) => &task.outputs,
            Self::Group(group) => group.outputs(),
        }
    }

    /// Variant tag.
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Cpu(_) => TaskKind::Cpu,
            Self::Gpu(_) => TaskKind::Gpu,
            Self::Group(_) => TaskKind::Group,
        }
    }

    /// Whether running this task does no work.
    pub fn is_pass_through(&self) -> bool {
        match self {
            Self::Cpu(_) => false,
            Self::Gpu(task) => task.is_pass_through(),
            Self::Group(group) => group.members().iter().all(|m| m.is_pass_through()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandBufferDescriptor;
    use crate::resources::{BufferId, TextureId};
    use thistle_core::arena::Index;

    fn buffer(slot: u32) -> TaskIo {
        BufferId::from_index(Index::from_raw_parts(slot, 0)).into()
    }

    fn texture(slot: u32) -> TaskIo {
        TextureId::from_index(Index::from_raw_parts(slot, 0)).into()
    }

    #[test]
    fn test_cpu_task_declares_io() {
        let task = PresentTask::cpu("update", [], [buffer(0)], |_| Ok(())).unwrap();
        assert_eq!(task.kind(), TaskKind::Cpu);
        assert_eq!(task.name(), "update");
        assert!(task.inputs().is_empty());
        assert_eq!(task.outputs(), &[buffer(0)]);
        assert!(!task.is_pass_through());
    }

    #[test]
    fn test_duplicate_io_rejected() {
        let err = PresentTask::cpu("dup", [buffer(1), buffer(1)], [], |_| Ok(())).unwrap_err();
        assert!(matches!(err, TaskError::DuplicateInput { .. }));

        let err = PresentTask::pass_through("dup", [texture(0), texture(0)]).unwrap_err();
        assert!(matches!(err, TaskError::DuplicateOutput { .. }));
    }

    #[test]
    fn test_gpu_task_requires_recorded_buffer() {
        let cmd = Arc::new(CommandBuffer::new(CommandBufferDescriptor::compute()));
        let err = PresentTask::gpu("compute", cmd, [], [texture(0)]).unwrap_err();
        assert_eq!(
            err,
            TaskError::CommandBufferNotRecorded {
                task: "compute".to_string()
            }
        );
    }

    #[test]
    fn test_pass_through_task() {
        let task = PresentTask::pass_through("cached", [texture(3)]).unwrap();
        assert_eq!(task.kind(), TaskKind::Gpu);
        assert!(task.is_pass_through());
        assert_eq!(task.outputs(), &[texture(3)]);
        match &*task {
            PresentTask::Gpu(gpu) => assert!(gpu.command_buffer().is_recorded()),
            other => panic!("unexpected task {other:?}"),
        }
    }

    #[test]
    fn test_pass_through_for_mirrors_io() {
        let full = PresentTask::cpu("full", [buffer(1)], [texture(2)], |_| Ok(())).unwrap();
        let cached = PresentTask::pass_through_for("cached", &full).unwrap();
        assert!(cached.is_pass_through());
        assert_eq!(cached.inputs(), full.inputs());
        assert_eq!(cached.outputs(), full.outputs());
    }

    #[test]
    fn test_task_error_display() {
        let err = TaskError::UndeclaredAccess {
            task: "upload".to_string(),
            resource: "buffer#0v0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "task 'upload' accessed undeclared resource buffer#0v0"
        );
    }
}

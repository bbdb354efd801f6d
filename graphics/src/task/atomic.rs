//! Atomic present tasks: one CPU callback or one command buffer.

use std::sync::Arc;

use crate::backend::HostAccess;
use crate::command::{CommandBuffer, CommandBufferDescriptor};
use crate::error::GraphicsError;
use crate::resources::{BufferId, TextureId};

use super::{TaskError, TaskIo};

/// Callback run by a CPU task.
///
/// Whatever the closure captures is its argument. Callbacks may run on any
/// thread and must not assume a rendering context is current.
pub type CpuCallback =
    Arc<dyn Fn(&mut CpuTaskContext<'_>) -> Result<(), GraphicsError> + Send + Sync>;

/// What a CPU callback sees while it runs.
///
/// Reads are allowed on any declared input or output. Writes are allowed on
/// declared outputs only.
pub struct CpuTaskContext<'a> {
    name: &'a str,
    inputs: &'a [TaskIo],
    outputs: &'a [TaskIo],
    host: &'a mut dyn HostAccess,
}

impl<'a> CpuTaskContext<'a> {
    /// Context for running the task `name` against `host`.
    pub fn new(
        name: &'a str,
        inputs: &'a [TaskIo],
        outputs: &'a [TaskIo],
        host: &'a mut dyn HostAccess,
    ) -> Self {
        Self {
            name,
            inputs,
            outputs,
            host,
        }
    }

    /// Name of the running task.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Declared inputs.
    pub fn inputs(&self) -> &[TaskIo] {
        self.inputs
    }

    /// Declared outputs.
    pub fn outputs(&self) -> &[TaskIo] {
        self.outputs
    }

    /// Read `dst.len()` bytes of `buffer` starting at `offset`.
    pub fn read_buffer(
        &self,
        buffer: BufferId,
        offset: u64,
        dst: &mut [u8],
    ) -> Result<(), GraphicsError> {
        self.check_declared(TaskIo::from(buffer))?;
        self.host.read_buffer(buffer, offset, dst)
    }

    /// Overwrite bytes of `buffer` starting at `offset`.
    pub fn write_buffer(
        &mut self,
        buffer: BufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        self.check_output(TaskIo::from(buffer))?;
        self.host.write_buffer(buffer, offset, data)
    }

    /// Write a plain-old-data value, e.g. a uniform block.
    pub fn write_pod<T: bytemuck::Pod>(
        &mut self,
        buffer: BufferId,
        offset: u64,
        value: &T,
    ) -> Result<(), GraphicsError> {
        self.write_buffer(buffer, offset, bytemuck::bytes_of(value))
    }

    /// Read the texels of one mip level.
    pub fn read_texture(
        &self,
        texture: TextureId,
        mip_level: u32,
        dst: &mut [u8],
    ) -> Result<(), GraphicsError> {
        self.check_declared(TaskIo::from(texture))?;
        self.host.read_texture(texture, mip_level, dst)
    }

    /// Overwrite the texels of one mip level.
    pub fn write_texture(
        &mut self,
        texture: TextureId,
        mip_level: u32,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        self.check_output(TaskIo::from(texture))?;
        self.host.write_texture(texture, mip_level, data)
    }

    fn check_declared(&self, io: TaskIo) -> Result<(), GraphicsError> {
        if self.inputs.contains(&io) || self.outputs.contains(&io) {
            Ok(())
        } else {
            Err(TaskError::UndeclaredAccess {
                task: self.name.to_owned(),
                resource: io.to_string(),
            }
            .into())
        }
    }

    fn check_output(&self, io: TaskIo) -> Result<(), GraphicsError> {
        if self.outputs.contains(&io) {
            Ok(())
        } else {
            Err(TaskError::UndeclaredAccess {
                task: self.name.to_owned(),
                resource: io.to_string(),
            }
            .into())
        }
    }
}

/// A task that runs a callback on the CPU.
pub struct CpuTask {
    pub(super) name: String,
    pub(super) inputs: Vec<TaskIo>,
    pub(super) outputs: Vec<TaskIo>,
    callback: CpuCallback,
}

impl CpuTask {
    pub(super) fn new(
        name: String,
        inputs: Vec<TaskIo>,
        outputs: Vec<TaskIo>,
        callback: CpuCallback,
    ) -> Result<Self, TaskError> {
        check_unique(&name, &inputs, false)?;
        check_unique(&name, &outputs, true)?;
        Ok(Self {
            name,
            inputs,
            outputs,
            callback,
        })
    }

    /// Run the callback against `host`.
    pub fn invoke(&self, host: &mut dyn HostAccess) -> Result<(), GraphicsError> {
        let mut ctx = CpuTaskContext::new(&self.name, &self.inputs, &self.outputs, host);
        (self.callback)(&mut ctx)
    }
}

impl std::fmt::Debug for CpuTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuTask")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// A task that submits one recorded command buffer.
///
/// The declared IO is trusted: it must list every resource the buffer
/// touches.
#[derive(Debug)]
pub struct GpuTask {
    pub(super) name: String,
    pub(super) inputs: Vec<TaskIo>,
    pub(super) outputs: Vec<TaskIo>,
    command_buffer: Arc<CommandBuffer>,
}

impl GpuTask {
    pub(super) fn new(
        name: String,
        command_buffer: Arc<CommandBuffer>,
        inputs: Vec<TaskIo>,
        outputs: Vec<TaskIo>,
    ) -> Result<Self, TaskError> {
        if !command_buffer.is_recorded() {
            return Err(TaskError::CommandBufferNotRecorded { task: name });
        }
        check_unique(&name, &inputs, false)?;
        check_unique(&name, &outputs, true)?;
        Ok(Self {
            name,
            inputs,
            outputs,
            command_buffer,
        })
    }

    pub(super) fn pass_through(
        name: String,
        inputs: Vec<TaskIo>,
        outputs: Vec<TaskIo>,
    ) -> Result<Self, TaskError> {
        let command_buffer = CommandBuffer::recorded_empty(
            CommandBufferDescriptor::new().with_label(format!("{name}_pass_through")),
        );
        Self::new(name, Arc::new(command_buffer), inputs, outputs)
    }

    /// The wrapped command buffer.
    pub fn command_buffer(&self) -> &Arc<CommandBuffer> {
        &self.command_buffer
    }

    /// Whether submitting this task does nothing: its buffer is empty, so
    /// the outputs are whatever an earlier frame left in them.
    pub fn is_pass_through(&self) -> bool {
        self.command_buffer.is_empty()
    }
}

fn check_unique(task: &str, ios: &[TaskIo], outputs: bool) -> Result<(), TaskError> {
    for (i, io) in ios.iter().enumerate() {
        if ios[..i].contains(io) {
            let task = task.to_owned();
            let resource = io.to_string();
            return Err(if outputs {
                TaskError::DuplicateOutput { task, resource }
            } else {
                TaskError::DuplicateInput { task, resource }
            });
        }
    }
    Ok(())
}

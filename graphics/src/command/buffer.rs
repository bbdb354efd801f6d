//! The command buffer object and its recording state.

use crate::resources::{FramebufferId, ResourceRegistry};

use super::pool::PoolSlot;
use super::recorder::Recorder;
use super::{Command, CommandBufferDescriptor, CommandBufferId, CommandError, QueueFlags};

/// Recording state of a [`CommandBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordingState {
    /// Never recorded.
    Created,
    /// A [`Recorder`] session is open.
    Recording,
    /// At least one session was finished; the buffer can be executed.
    Recorded,
}

/// A replayable sequence of GPU operations.
///
/// Buffers are long-lived: producers record them once and rebuild them only
/// when the operation sequence itself changes. Recording goes through
/// [`start_recording`](Self::start_recording), which returns a [`Recorder`]
/// borrowing the buffer until the session is finished or abandoned.
pub struct CommandBuffer {
    id: CommandBufferId,
    descriptor: CommandBufferDescriptor,
    pub(super) state: RecordingState,
    pub(super) target: Option<FramebufferId>,
    pub(super) commands: Vec<Command>,
    pub(super) record_count: u32,
    pub(super) sync_serial: u32,
    _pool_slot: Option<PoolSlot>,
}

impl CommandBuffer {
    /// Create an empty, unrecorded buffer.
    pub fn new(descriptor: CommandBufferDescriptor) -> Self {
        Self::with_slot(descriptor, None)
    }

    /// Create a buffer that is already recorded and holds no operations.
    ///
    /// Used by pass-through tasks, which only declare outputs.
    pub fn recorded_empty(descriptor: CommandBufferDescriptor) -> Self {
        let mut buffer = Self::new(descriptor);
        buffer.state = RecordingState::Recorded;
        buffer.record_count = 1;
        buffer
    }

    pub(super) fn with_slot(descriptor: CommandBufferDescriptor, slot: Option<PoolSlot>) -> Self {
        let id = CommandBufferId::next();
        log::trace!("Created command buffer {} ({:?})", id, descriptor.label);
        Self {
            id,
            descriptor,
            state: RecordingState::Created,
            target: None,
            commands: Vec::new(),
            record_count: 0,
            sync_serial: 0,
            _pool_slot: slot,
        }
    }

    /// Open a recording session.
    ///
    /// `target` is the framebuffer draws render into, or `None` for
    /// compute-only work. Fails if the buffer is one-shot and was already
    /// recorded, or if `target` does not resolve. Finishing the session on a
    /// previously recorded buffer replaces its operations.
    pub fn start_recording<'a>(
        &'a mut self,
        registry: &'a ResourceRegistry,
        target: Option<FramebufferId>,
    ) -> Result<Recorder<'a>, CommandError> {
        if !self.descriptor.resettable && self.record_count > 0 {
            return Err(CommandError::AlreadyRecorded);
        }
        if let Some(framebuffer) = target {
            registry
                .framebuffer(framebuffer)
                .map_err(|_| CommandError::InvalidResource(framebuffer.to_string()))?;
        }
        Ok(Recorder::begin(self, registry, target))
    }

    /// Process-unique identity.
    pub fn id(&self) -> CommandBufferId {
        self.id
    }

    /// Debug label.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Creation parameters.
    pub fn descriptor(&self) -> &CommandBufferDescriptor {
        &self.descriptor
    }

    /// Queues this buffer may be submitted to.
    pub fn queues(&self) -> QueueFlags {
        self.descriptor.queues
    }

    /// Whether other buffers may execute this one.
    pub fn is_invokable(&self) -> bool {
        self.descriptor.invokable
    }

    /// Whether the buffer may be recorded again.
    pub fn is_resettable(&self) -> bool {
        self.descriptor.resettable
    }

    /// Current recording state.
    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Whether a session has been finished on this buffer.
    pub fn is_recorded(&self) -> bool {
        self.state == RecordingState::Recorded
    }

    /// Framebuffer bound when the last session started.
    pub fn target(&self) -> Option<FramebufferId> {
        self.target
    }

    /// Recorded operations in order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of recorded operations.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether no operation was recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of finished sessions.
    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    /// Whether replaying needs a graphics queue.
    pub fn needs_graphics(&self) -> bool {
        self.target.is_some()
            || self.commands.iter().any(|command| {
                matches!(command, Command::SetFramebuffer { .. } | Command::Draw(_))
                    || matches!(command, Command::ExecuteCommandBuffer(nested) if nested.needs_graphics())
            })
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("id", &self.id)
            .field("label", &self.descriptor.label)
            .field("state", &self.state)
            .field("target", &self.target)
            .field("commands", &self.commands.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thistle_core::arena::Index;

    use crate::resources::FramebufferDescriptor;
    use crate::types::{TextureDescriptor, TextureFormat, TextureUsage};

    #[test]
    fn test_start_then_finish_yields_empty_recorded_buffer() {
        let registry = ResourceRegistry::new();
        let mut cmd = CommandBuffer::new(CommandBufferDescriptor::compute());
        assert_eq!(cmd.state(), RecordingState::Created);

        cmd.start_recording(&registry, None).unwrap().finish();

        assert_eq!(cmd.state(), RecordingState::Recorded);
        assert!(cmd.is_empty());
        assert_eq!(cmd.record_count(), 1);
        assert!(!cmd.needs_graphics());
    }

    #[test]
    fn test_one_shot_buffer_cannot_restart() {
        let registry = ResourceRegistry::new();
        let mut cmd = CommandBuffer::new(CommandBufferDescriptor::new().one_shot());
        cmd.start_recording(&registry, None).unwrap().finish();

        let err = cmd.start_recording(&registry, None).unwrap_err();
        assert_eq!(err, CommandError::AlreadyRecorded);
        assert_eq!(cmd.state(), RecordingState::Recorded);
    }

    #[test]
    fn test_invalid_target_rejected() {
        let mut registry = ResourceRegistry::new();
        let texture = registry
            .create_texture(&TextureDescriptor::new_2d(
                4,
                4,
                TextureFormat::Rgba8Unorm,
                TextureUsage::RENDER_ATTACHMENT,
            ))
            .unwrap();
        let view = registry.create_texture_view(texture, 0).unwrap();
        let framebuffer = registry
            .create_framebuffer(&FramebufferDescriptor::new().with_color(view))
            .unwrap();

        let mut cmd = CommandBuffer::new(CommandBufferDescriptor::graphics());
        let stale = FramebufferId::from_index(Index::from_raw_parts(7, 0));
        assert!(matches!(
            cmd.start_recording(&registry, Some(stale)),
            Err(CommandError::InvalidResource(_))
        ));

        cmd.start_recording(&registry, Some(framebuffer))
            .unwrap()
            .finish();
        assert_eq!(cmd.target(), Some(framebuffer));
        assert!(cmd.needs_graphics());
    }
}

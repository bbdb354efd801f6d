//! Recording sessions.

use std::sync::Arc;

use crate::resources::{
    BindingSlot, BufferId, FramebufferId, ProgramId, ProgramKind, ResourceRegistry, TextureId,
    TextureViewId,
};
use crate::types::{
    BufferDescriptor, BufferUsage, DrawIndexedIndirectArgs, DrawIndirectArgs, TextureDescriptor,
    TextureUsage,
};

use super::buffer::{CommandBuffer, RecordingState};
use super::ops::{
    AttachmentLoad, Binding, BoundResource, Command, DrawCall, GraphicsState, TextureCopyRegion,
};
use super::{CommandError, SyncPoint};

/// An open recording session on a [`CommandBuffer`].
///
/// Every `record` method validates its arguments against the
/// [`ResourceRegistry`] and the current program before appending anything;
/// a rejected call leaves the session exactly as it was. Operations become
/// visible on the buffer only when [`finish`](Self::finish) is called.
/// Dropping the recorder instead abandons the session and keeps whatever the
/// buffer held before.
pub struct Recorder<'a> {
    buffer: &'a mut CommandBuffer,
    registry: &'a ResourceRegistry,
    previous_state: RecordingState,
    target: Option<FramebufferId>,
    commands: Vec<Command>,
    program: Option<ProgramId>,
    framebuffer: Option<FramebufferId>,
    sync_serial: u32,
    finished: bool,
}

impl<'a> Recorder<'a> {
    pub(super) fn begin(
        buffer: &'a mut CommandBuffer,
        registry: &'a ResourceRegistry,
        target: Option<FramebufferId>,
    ) -> Self {
        let previous_state = buffer.state;
        buffer.state = RecordingState::Recording;
        let sync_serial = buffer.sync_serial;
        log::trace!("Recording {} (target {:?})", buffer.id(), target);
        Self {
            buffer,
            registry,
            previous_state,
            target,
            commands: Vec::new(),
            program: None,
            framebuffer: target,
            sync_serial,
            finished: false,
        }
    }

    /// Buffer being recorded.
    pub fn buffer(&self) -> &CommandBuffer {
        self.buffer
    }

    /// Operations recorded so far in this session.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Select the program used by following dispatches and draws.
    pub fn set_program(&mut self, program: ProgramId) -> Result<(), CommandError> {
        self.registry
            .program(program)
            .map_err(|_| CommandError::InvalidResource(program.to_string()))?;
        self.program = Some(program);
        self.push(Command::SetProgram(program));
        Ok(())
    }

    /// Assign resources to binding slots.
    ///
    /// When the current program carries a layout, every slot must be
    /// declared by it with a matching kind. Later assignments to the same
    /// slot within a session replace earlier ones.
    pub fn set_bindings(&mut self, bindings: &[Binding]) -> Result<(), CommandError> {
        let layout = match self.program {
            Some(program) => self
                .registry
                .program(program)
                .map_err(|_| CommandError::InvalidResource(program.to_string()))?
                .layout
                .as_ref(),
            None => None,
        };
        for binding in bindings {
            self.check_bound_resource(&binding.resource)?;
            if let Some(layout) = layout {
                let decl = layout
                    .find(&binding.slot)
                    .ok_or_else(|| CommandError::UnknownBinding(binding.slot.clone()))?;
                let found = binding.resource.kind();
                if decl.kind != found {
                    return Err(CommandError::BindingKindMismatch {
                        slot: binding.slot.clone(),
                        expected: decl.kind,
                        found,
                    });
                }
            }
        }
        self.push(Command::SetBindings(bindings.to_vec()));
        Ok(())
    }

    /// Assign one resource to one slot.
    pub fn set_binding(
        &mut self,
        slot: impl Into<BindingSlot>,
        resource: BoundResource,
    ) -> Result<(), CommandError> {
        self.set_bindings(&[Binding::new(slot, resource)])
    }

    /// Apply viewport, scissor, blend and raster state.
    pub fn set_state(&mut self, state: GraphicsState) -> Result<(), CommandError> {
        if let Some(viewport) = state.viewport {
            if viewport.width <= 0.0 || viewport.height <= 0.0 {
                return Err(CommandError::OutOfBounds(format!(
                    "viewport {}x{} is empty",
                    viewport.width, viewport.height
                )));
            }
        }
        self.push(Command::SetState(state));
        Ok(())
    }

    /// Launch the current compute program over `x * y * z` work groups.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), CommandError> {
        self.require_program(ProgramKind::Compute)?;
        self.push(Command::Dispatch { groups: [x, y, z] });
        Ok(())
    }

    /// Launch the current graphics program into the bound framebuffer.
    pub fn draw(&mut self, call: DrawCall) -> Result<(), CommandError> {
        self.require_program(ProgramKind::Graphics)?;
        if self.framebuffer.is_none() {
            return Err(CommandError::NoFramebuffer);
        }
        match call {
            DrawCall::Regular { .. } => {}
            DrawCall::Indexed {
                index_buffer,
                index_count,
                first_index,
                ..
            } => {
                let end = (u64::from(first_index) + u64::from(index_count)) * 4;
                let desc = self.index_buffer(index_buffer)?;
                if end > desc.size {
                    return Err(CommandError::OutOfBounds(format!(
                        "{index_buffer} holds {} bytes, draw reads up to {end}",
                        desc.size
                    )));
                }
            }
            DrawCall::Indirect {
                buffer,
                offset,
                index_buffer,
            } => {
                let desc = self.buffer_desc(buffer)?;
                if !desc.usage.contains(BufferUsage::INDIRECT) {
                    return Err(CommandError::InvalidUsage(format!(
                        "{buffer} lacks INDIRECT usage"
                    )));
                }
                let args_size = if index_buffer.is_some() {
                    DrawIndexedIndirectArgs::SIZE
                } else {
                    DrawIndirectArgs::SIZE
                };
                let fits = offset
                    .checked_add(args_size)
                    .is_some_and(|end| end <= desc.size);
                if offset % 4 != 0 || !fits {
                    return Err(CommandError::OutOfBounds(format!(
                        "indirect arguments at {offset} do not fit {buffer} ({} bytes)",
                        desc.size
                    )));
                }
                if let Some(index_buffer) = index_buffer {
                    self.index_buffer(index_buffer)?;
                }
            }
        }
        self.push(Command::Draw(call));
        Ok(())
    }

    /// Copy texel regions from `src` to `dst`.
    pub fn copy_texture(
        &mut self,
        src: TextureId,
        dst: TextureId,
        regions: &[TextureCopyRegion],
    ) -> Result<(), CommandError> {
        let src_desc = self.texture_desc(src)?;
        let dst_desc = self.texture_desc(dst)?;
        if !src_desc.usage.contains(TextureUsage::COPY_SRC) {
            return Err(CommandError::InvalidUsage(format!("{src} lacks COPY_SRC usage")));
        }
        if !dst_desc.usage.contains(TextureUsage::COPY_DST) {
            return Err(CommandError::InvalidUsage(format!("{dst} lacks COPY_DST usage")));
        }
        if src_desc.format != dst_desc.format {
            return Err(CommandError::InvalidUsage(format!(
                "format {:?} of {src} differs from {:?} of {dst}",
                src_desc.format, dst_desc.format
            )));
        }
        for region in regions {
            check_region(src, src_desc, region.src_mip, region.src_origin, region)?;
            check_region(dst, dst_desc, region.dst_mip, region.dst_origin, region)?;
        }
        self.push(Command::CopyTexture {
            src,
            dst,
            regions: regions.to_vec(),
        });
        Ok(())
    }

    /// Fill `size` bytes of `buffer` from `offset` with a repeated value.
    pub fn fill_buffer(
        &mut self,
        buffer: BufferId,
        offset: u64,
        size: u64,
        value: u32,
    ) -> Result<(), CommandError> {
        let desc = self.buffer_desc(buffer)?;
        if offset % 4 != 0 || size % 4 != 0 {
            return Err(CommandError::MisalignedFill { offset, size });
        }
        if offset.checked_add(size).map_or(true, |end| end > desc.size) {
            return Err(CommandError::OutOfBounds(format!(
                "fill of {size} bytes at {offset} exceeds {buffer} ({} bytes)",
                desc.size
            )));
        }
        if !desc.usage.contains(BufferUsage::COPY_DST) {
            return Err(CommandError::InvalidUsage(format!("{buffer} lacks COPY_DST usage")));
        }
        self.push(Command::FillBuffer {
            buffer,
            offset,
            size,
            value,
        });
        Ok(())
    }

    /// Bind a framebuffer with one load policy per attachment, colors first.
    pub fn set_framebuffer(
        &mut self,
        framebuffer: FramebufferId,
        loads: &[AttachmentLoad],
    ) -> Result<(), CommandError> {
        let desc = self
            .registry
            .framebuffer(framebuffer)
            .map_err(|_| CommandError::InvalidResource(framebuffer.to_string()))?;
        if desc.attachment_count() != loads.len() {
            return Err(CommandError::LoadPolicyCountMismatch {
                attachments: desc.attachment_count(),
                policies: loads.len(),
            });
        }
        self.framebuffer = Some(framebuffer);
        self.push(Command::SetFramebuffer {
            framebuffer,
            loads: loads.to_vec(),
        });
        Ok(())
    }

    /// Replay `nested` inline when this buffer executes.
    pub fn execute_command_buffer(&mut self, nested: &Arc<CommandBuffer>) -> Result<(), CommandError> {
        if nested.id() == self.buffer.id() {
            return Err(CommandError::SelfExecution);
        }
        if !nested.is_invokable() {
            return Err(CommandError::NotInvokable);
        }
        if !nested.is_recorded() {
            return Err(CommandError::NotRecorded);
        }
        let parent = self.buffer.queues();
        if !nested.queues().contains(parent) {
            return Err(CommandError::IncompatibleQueues {
                parent,
                nested: nested.queues(),
            });
        }
        self.push(Command::ExecuteCommandBuffer(Arc::clone(nested)));
        Ok(())
    }

    /// Emit a named marker other buffers can wait on.
    pub fn record_sync_point(&mut self, name: &str) -> SyncPoint {
        let point = SyncPoint {
            name: Arc::from(name),
            source: self.buffer.id(),
            serial: self.sync_serial,
        };
        self.sync_serial += 1;
        self.push(Command::SignalSyncPoint(point.clone()));
        point
    }

    /// Wait until another buffer has passed `point`.
    pub fn wait_sync_point(&mut self, point: &SyncPoint) -> Result<(), CommandError> {
        if point.source() == self.buffer.id() {
            return Err(CommandError::WaitOnOwnSyncPoint(point.to_string()));
        }
        self.push(Command::WaitSyncPoint(point.clone()));
        Ok(())
    }

    /// Close the session and publish its operations on the buffer.
    pub fn finish(mut self) {
        self.finished = true;
        let commands = std::mem::take(&mut self.commands);
        log::trace!(
            "Finished recording {} ({} commands)",
            self.buffer.id(),
            commands.len()
        );
        self.buffer.commands = commands;
        self.buffer.target = self.target;
        self.buffer.sync_serial = self.sync_serial;
        self.buffer.record_count += 1;
        self.buffer.state = RecordingState::Recorded;
    }

    fn push(&mut self, command: Command) {
        log::trace!("{}: {}", self.buffer.id(), command.label());
        self.commands.push(command);
    }

    fn require_program(&self, expected: ProgramKind) -> Result<(), CommandError> {
        let program = self.program.ok_or(CommandError::NoProgram)?;
        let found = self
            .registry
            .program(program)
            .map_err(|_| CommandError::InvalidResource(program.to_string()))?
            .kind;
        if found != expected {
            return Err(CommandError::ProgramKindMismatch { expected, found });
        }
        Ok(())
    }

    fn buffer_desc(&self, buffer: BufferId) -> Result<&'a BufferDescriptor, CommandError> {
        self.registry
            .buffer(buffer)
            .map_err(|_| CommandError::InvalidResource(buffer.to_string()))
    }

    fn index_buffer(&self, buffer: BufferId) -> Result<&'a BufferDescriptor, CommandError> {
        let desc = self.buffer_desc(buffer)?;
        if !desc.usage.contains(BufferUsage::INDEX) {
            return Err(CommandError::InvalidUsage(format!("{buffer} lacks INDEX usage")));
        }
        Ok(desc)
    }

    fn texture_desc(&self, texture: TextureId) -> Result<&'a TextureDescriptor, CommandError> {
        self.registry
            .texture(texture)
            .map_err(|_| CommandError::InvalidResource(texture.to_string()))
    }

    fn view_target(&self, view: TextureViewId) -> Result<(), CommandError> {
        self.registry
            .texture_view_target(view)
            .map(|_| ())
            .map_err(|_| CommandError::InvalidResource(view.to_string()))
    }

    fn check_bound_resource(&self, resource: &BoundResource) -> Result<(), CommandError> {
        match *resource {
            BoundResource::Buffer {
                buffer,
                offset,
                size,
            } => {
                let desc = self.buffer_desc(buffer)?;
                let size = size.unwrap_or(0);
                let fits = offset
                    .checked_add(size)
                    .is_some_and(|end| offset < desc.size && end <= desc.size);
                if !fits {
                    return Err(CommandError::OutOfBounds(format!(
                        "{size} bytes at {offset} of {buffer} ({} bytes)",
                        desc.size
                    )));
                }
            }
            BoundResource::VertexAttribute { buffer, offset, .. } => {
                let desc = self.buffer_desc(buffer)?;
                if offset >= desc.size {
                    return Err(CommandError::OutOfBounds(format!(
                        "attribute offset {offset} past {buffer} ({} bytes)",
                        desc.size
                    )));
                }
            }
            BoundResource::Texture(texture) => {
                self.texture_desc(texture)?;
            }
            BoundResource::Image(view) => self.view_target(view)?,
        }
        Ok(())
    }
}

fn check_region(
    texture: TextureId,
    desc: &TextureDescriptor,
    mip: u32,
    origin: crate::types::Origin3d,
    region: &TextureCopyRegion,
) -> Result<(), CommandError> {
    if mip >= desc.mip_level_count {
        return Err(CommandError::OutOfBounds(format!(
            "mip {mip} of {texture} ({} levels)",
            desc.mip_level_count
        )));
    }
    let extent = desc.mip_extent(mip);
    let fits = u64::from(origin.x) + u64::from(region.size.width) <= u64::from(extent.width)
        && u64::from(origin.y) + u64::from(region.size.height) <= u64::from(extent.height)
        && u64::from(origin.z) + u64::from(region.size.depth) <= u64::from(extent.depth);
    if !fits {
        return Err(CommandError::OutOfBounds(format!(
            "region {:?} at {:?} exceeds mip {mip} of {texture}",
            region.size, origin
        )));
    }
    Ok(())
}

impl Drop for Recorder<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!(
                "Recording session on {} abandoned with {} commands; keeping previous contents",
                self.buffer.id(),
                self.commands.len()
            );
            self.buffer.state = self.previous_state;
        }
    }
}

impl std::fmt::Debug for Recorder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("buffer", &self.buffer.id())
            .field("target", &self.target)
            .field("commands", &self.commands.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandBufferDescriptor, QueueFlags};
    use crate::resources::{BindingKind, FramebufferDescriptor, ProgramDescriptor, ProgramLayout};
    use crate::types::{ClearValue, Extent3d, TextureFormat};

    struct Fixture {
        registry: ResourceRegistry,
        kernel: ProgramId,
        raster: ProgramId,
        params: BufferId,
        field: TextureId,
        field_view: TextureViewId,
        framebuffer: FramebufferId,
    }

    fn fixture() -> Fixture {
        let mut registry = ResourceRegistry::new();
        let kernel = registry
            .create_program(
                &ProgramDescriptor::compute().with_layout(
                    ProgramLayout::new()
                        .with_binding("params", 0, BindingKind::Buffer)
                        .with_binding("field", 1, BindingKind::Image),
                ),
            )
            .unwrap();
        let raster = registry.create_program(&ProgramDescriptor::graphics()).unwrap();
        let params = registry
            .create_buffer(&BufferDescriptor::new(
                64,
                BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            ))
            .unwrap();
        let field = registry
            .create_texture(&TextureDescriptor::new_3d(
                4,
                4,
                4,
                TextureFormat::R32Float,
                TextureUsage::STORAGE_BINDING | TextureUsage::COPY_SRC | TextureUsage::COPY_DST,
            ))
            .unwrap();
        let field_view = registry.create_texture_view(field, 0).unwrap();
        let color = registry
            .create_texture(&TextureDescriptor::new_2d(
                8,
                8,
                TextureFormat::Rgba8Unorm,
                TextureUsage::RENDER_ATTACHMENT,
            ))
            .unwrap();
        let color_view = registry.create_texture_view(color, 0).unwrap();
        let framebuffer = registry
            .create_framebuffer(&FramebufferDescriptor::new().with_color(color_view))
            .unwrap();
        Fixture {
            registry,
            kernel,
            raster,
            params,
            field,
            field_view,
            framebuffer,
        }
    }

    #[test]
    fn test_compute_session() {
        let fx = fixture();
        let mut cmd = CommandBuffer::new(CommandBufferDescriptor::compute());
        let mut rec = cmd.start_recording(&fx.registry, None).unwrap();
        rec.set_program(fx.kernel).unwrap();
        rec.set_bindings(&[
            Binding::new("params", BoundResource::buffer(fx.params)),
            Binding::new(1u32, BoundResource::Image(fx.field_view)),
        ])
        .unwrap();
        rec.dispatch(1, 1, 4).unwrap();
        rec.finish();

        let labels: Vec<_> = cmd.commands().iter().map(Command::label).collect();
        assert_eq!(labels, ["set_program", "set_bindings", "dispatch"]);
    }

    #[test]
    fn test_rejected_record_leaves_session_unchanged() {
        let fx = fixture();
        let mut cmd = CommandBuffer::new(CommandBufferDescriptor::compute());
        let mut rec = cmd.start_recording(&fx.registry, None).unwrap();

        assert_eq!(rec.dispatch(1, 1, 1), Err(CommandError::NoProgram));
        rec.set_program(fx.kernel).unwrap();

        let err = rec
            .set_bindings(&[
                Binding::new("params", BoundResource::buffer(fx.params)),
                Binding::new("field", BoundResource::Texture(fx.field)),
            ])
            .unwrap_err();
        assert_eq!(
            err,
            CommandError::BindingKindMismatch {
                slot: "field".into(),
                expected: BindingKind::Image,
                found: BindingKind::Texture,
            }
        );
        assert_eq!(
            rec.set_binding("weights", BoundResource::buffer(fx.params)),
            Err(CommandError::UnknownBinding("weights".into()))
        );
        assert_eq!(
            rec.fill_buffer(fx.params, 2, 8, 0),
            Err(CommandError::MisalignedFill { offset: 2, size: 8 })
        );
        assert!(matches!(
            rec.fill_buffer(fx.params, 60, 8, 0),
            Err(CommandError::OutOfBounds(_))
        ));
        assert_eq!(rec.commands().len(), 1);
        rec.finish();
        assert_eq!(cmd.len(), 1);
    }

    #[test]
    fn test_wrapping_ranges_are_out_of_bounds() {
        let fx = fixture();
        let mut cmd = CommandBuffer::new(CommandBufferDescriptor::compute());
        let mut rec = cmd.start_recording(&fx.registry, None).unwrap();
        rec.set_program(fx.kernel).unwrap();

        assert!(matches!(
            rec.fill_buffer(fx.params, u64::MAX - 3, 8, 0),
            Err(CommandError::OutOfBounds(_))
        ));
        let wrapped = BoundResource::Buffer {
            buffer: fx.params,
            offset: 16,
            size: Some(u64::MAX),
        };
        assert!(matches!(
            rec.set_binding("params", wrapped),
            Err(CommandError::OutOfBounds(_))
        ));
        assert_eq!(rec.commands().len(), 1);
    }

    #[test]
    fn test_wrapping_indirect_offset_is_out_of_bounds() {
        let mut fx = fixture();
        let args = fx
            .registry
            .create_buffer(&BufferDescriptor::new(32, BufferUsage::INDIRECT))
            .unwrap();
        let mut cmd = CommandBuffer::new(CommandBufferDescriptor::graphics());
        let mut rec = cmd.start_recording(&fx.registry, None).unwrap();
        rec.set_program(fx.raster).unwrap();
        rec.set_framebuffer(fx.framebuffer, &[AttachmentLoad::Reuse]).unwrap();

        rec.draw(DrawCall::indirect(args, 16)).unwrap();
        assert!(matches!(
            rec.draw(DrawCall::indirect(args, u64::MAX - 7)),
            Err(CommandError::OutOfBounds(_))
        ));
        assert_eq!(rec.commands().len(), 3);
    }

    #[test]
    fn test_abandoned_session_restores_previous_contents() {
        let fx = fixture();
        let mut cmd = CommandBuffer::new(CommandBufferDescriptor::compute());
        {
            let mut rec = cmd.start_recording(&fx.registry, None).unwrap();
            rec.fill_buffer(fx.params, 0, 64, 7).unwrap();
            rec.finish();
        }
        {
            let mut rec = cmd.start_recording(&fx.registry, None).unwrap();
            rec.set_program(fx.kernel).unwrap();
            rec.dispatch(2, 2, 2).unwrap();
        }
        assert_eq!(cmd.state(), RecordingState::Recorded);
        assert_eq!(cmd.len(), 1);
        assert!(matches!(cmd.commands()[0], Command::FillBuffer { value: 7, .. }));

        let mut fresh = CommandBuffer::new(CommandBufferDescriptor::compute());
        drop(fresh.start_recording(&fx.registry, None).unwrap());
        assert_eq!(fresh.state(), RecordingState::Created);
    }

    #[test]
    fn test_restart_replaces_operations() {
        let fx = fixture();
        let mut cmd = CommandBuffer::new(CommandBufferDescriptor::compute());
        let mut rec = cmd.start_recording(&fx.registry, None).unwrap();
        rec.fill_buffer(fx.params, 0, 16, 1).unwrap();
        rec.fill_buffer(fx.params, 16, 16, 2).unwrap();
        rec.finish();
        assert_eq!(cmd.len(), 2);

        cmd.start_recording(&fx.registry, None).unwrap().finish();
        assert!(cmd.is_empty());
        assert_eq!(cmd.record_count(), 2);
    }

    #[test]
    fn test_draw_requires_framebuffer_and_graphics_program() {
        let fx = fixture();
        let mut cmd = CommandBuffer::new(CommandBufferDescriptor::graphics());
        let mut rec = cmd.start_recording(&fx.registry, None).unwrap();
        rec.set_program(fx.kernel).unwrap();
        assert_eq!(
            rec.draw(DrawCall::regular(3, 1)),
            Err(CommandError::ProgramKindMismatch {
                expected: ProgramKind::Graphics,
                found: ProgramKind::Compute,
            })
        );
        rec.set_program(fx.raster).unwrap();
        assert_eq!(rec.draw(DrawCall::regular(3, 1)), Err(CommandError::NoFramebuffer));

        assert_eq!(
            rec.set_framebuffer(fx.framebuffer, &[]),
            Err(CommandError::LoadPolicyCountMismatch {
                attachments: 1,
                policies: 0,
            })
        );
        rec.set_framebuffer(
            fx.framebuffer,
            &[AttachmentLoad::Clear(ClearValue::color(0.0, 0.0, 0.0, 1.0))],
        )
        .unwrap();
        rec.draw(DrawCall::regular(3, 1)).unwrap();
        rec.finish();
        assert!(cmd.needs_graphics());
    }

    #[test]
    fn test_copy_texture_bounds() {
        let fx = fixture();
        let mut cmd = CommandBuffer::new(CommandBufferDescriptor::compute());
        let mut rec = cmd.start_recording(&fx.registry, None).unwrap();
        rec.copy_texture(
            fx.field,
            fx.field,
            &[TextureCopyRegion::mip(0, Extent3d::new_3d(4, 4, 1))],
        )
        .unwrap();
        assert!(matches!(
            rec.copy_texture(
                fx.field,
                fx.field,
                &[TextureCopyRegion::mip(0, Extent3d::new_3d(4, 4, 5))],
            ),
            Err(CommandError::OutOfBounds(_))
        ));
        assert!(matches!(
            rec.copy_texture(
                fx.field,
                fx.field,
                &[TextureCopyRegion::mip(1, Extent3d::new_3d(1, 1, 1))],
            ),
            Err(CommandError::OutOfBounds(_))
        ));
        rec.finish();
        assert_eq!(cmd.len(), 1);
    }

    #[test]
    fn test_nested_buffer_checks() {
        let fx = fixture();
        let mut one_queue = CommandBuffer::new(CommandBufferDescriptor::compute().invokable());
        let unrecorded = Arc::new(CommandBuffer::new(
            CommandBufferDescriptor::new().invokable(),
        ));
        let mut plain = CommandBuffer::new(CommandBufferDescriptor::new());
        plain.start_recording(&fx.registry, None).unwrap().finish();
        let plain = Arc::new(plain);
        one_queue.start_recording(&fx.registry, None).unwrap().finish();
        let one_queue = Arc::new(one_queue);

        let mut parent = CommandBuffer::new(CommandBufferDescriptor::new());
        let mut rec = parent.start_recording(&fx.registry, None).unwrap();
        assert_eq!(rec.execute_command_buffer(&plain), Err(CommandError::NotInvokable));
        assert_eq!(
            rec.execute_command_buffer(&unrecorded),
            Err(CommandError::NotRecorded)
        );
        assert_eq!(
            rec.execute_command_buffer(&one_queue),
            Err(CommandError::IncompatibleQueues {
                parent: QueueFlags::GRAPHICS | QueueFlags::COMPUTE,
                nested: QueueFlags::COMPUTE,
            })
        );
        assert!(rec.commands().is_empty());
        rec.finish();

        let mut compute_parent = CommandBuffer::new(CommandBufferDescriptor::compute());
        let mut rec = compute_parent.start_recording(&fx.registry, None).unwrap();
        rec.execute_command_buffer(&one_queue).unwrap();
        rec.finish();
        assert_eq!(compute_parent.len(), 1);
        assert_eq!(Arc::strong_count(&one_queue), 2);
    }

    #[test]
    fn test_sync_points() {
        let fx = fixture();
        let mut producer = CommandBuffer::new(CommandBufferDescriptor::compute());
        let mut rec = producer.start_recording(&fx.registry, None).unwrap();
        let point = rec.record_sync_point("field_ready");
        let second = rec.record_sync_point("field_ready");
        assert_ne!(point, second);
        assert!(matches!(
            rec.wait_sync_point(&point),
            Err(CommandError::WaitOnOwnSyncPoint(_))
        ));
        rec.finish();
        assert_eq!(point.source(), producer.id());
        assert_eq!(point.name(), "field_ready");

        let mut consumer = CommandBuffer::new(CommandBufferDescriptor::compute());
        let mut rec = consumer.start_recording(&fx.registry, None).unwrap();
        rec.wait_sync_point(&point).unwrap();
        rec.finish();
        assert!(matches!(consumer.commands()[0], Command::WaitSyncPoint(_)));
    }
}

//! Software backend.
//!
//! Interprets recorded command buffers on the CPU. Buffers and textures are
//! plain byte vectors, and programs are Rust closures ([`Kernel`]) registered
//! per [`ProgramId`]. It exists so the present-task graph can be executed
//! and observed without a GPU: fills, copies and framebuffer loads are
//! applied to memory, dispatches and draws call the registered kernel, and
//! sync point waits are checked against earlier signals.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::command::{
    AttachmentLoad, Binding, BoundResource, Command, CommandBuffer, DrawCall, GraphicsState,
    QueueFlags, SyncPoint, TextureCopyRegion,
};
use crate::error::GraphicsError;
use crate::resources::{
    BindingSlot, BufferId, FramebufferDescriptor, FramebufferId, ProgramDescriptor, ProgramId,
    ProgramLayout, ResourceAllocator, ResourceRegistry, TextureId, TextureViewId,
};
use crate::types::{BufferDescriptor, Extent3d, TextureDescriptor, TextureFormat};

use super::{Backend, HostAccess};

/// A program implemented on the CPU.
pub type Kernel = Arc<dyn Fn(&mut KernelContext<'_>) -> Result<(), GraphicsError> + Send + Sync>;

/// Why a kernel is being invoked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispatchInvocation {
    /// A compute dispatch.
    Compute {
        /// Work-group counts.
        groups: [u32; 3],
    },
    /// A draw into a framebuffer.
    Draw {
        /// Draw parameters.
        call: DrawCall,
        /// Bound framebuffer.
        framebuffer: FramebufferId,
    },
}

/// Software backend settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareBackendConfig {
    /// Total bytes of buffer and texture memory; `None` is unlimited.
    pub memory_budget: Option<u64>,
    /// Byte written into attachments loaded with
    /// [`AttachmentLoad::Invalidate`].
    pub invalidate_pattern: u8,
    /// Fail a submission that waits on a sync point never signaled.
    pub strict_sync_points: bool,
}

impl Default for SoftwareBackendConfig {
    fn default() -> Self {
        Self {
            memory_budget: None,
            invalidate_pattern: 0xCD,
            strict_sync_points: true,
        }
    }
}

impl SoftwareBackendConfig {
    /// Limit total resource memory.
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    /// Byte pattern for invalidated attachments.
    pub fn with_invalidate_pattern(mut self, pattern: u8) -> Self {
        self.invalidate_pattern = pattern;
        self
    }

    /// Let waits on unknown sync points pass.
    pub fn lenient_sync_points(mut self) -> Self {
        self.strict_sync_points = false;
        self
    }
}

/// Counters of everything the backend replayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Submitted command buffers.
    pub submissions: u64,
    /// Executed dispatches.
    pub dispatches: u64,
    /// Executed draws.
    pub draws: u64,
    /// Executed texture copies.
    pub copies: u64,
    /// Executed buffer fills.
    pub fills: u64,
    /// Framebuffer binds.
    pub framebuffer_binds: u64,
    /// Nested command buffers replayed.
    pub nested_executions: u64,
    /// Sync points signaled.
    pub sync_signals: u64,
    /// Sync point waits.
    pub sync_waits: u64,
    /// Calls to `wait_idle`.
    pub idle_waits: u64,
}

#[derive(Debug, Default)]
struct DeviceMemory {
    buffers: HashMap<BufferId, Vec<u8>>,
    textures: HashMap<TextureId, Vec<Vec<u8>>>,
    used: u64,
}

impl DeviceMemory {
    fn buffer_range(&self, id: BufferId, offset: u64, len: usize) -> Result<&[u8], GraphicsError> {
        let data = self
            .buffers
            .get(&id)
            .ok_or_else(|| GraphicsError::InvalidHandle(id.to_string()))?;
        let range = byte_range(id, data.len(), offset, len)?;
        Ok(&data[range])
    }

    fn buffer_range_mut(
        &mut self,
        id: BufferId,
        offset: u64,
        len: usize,
    ) -> Result<&mut [u8], GraphicsError> {
        let data = self
            .buffers
            .get_mut(&id)
            .ok_or_else(|| GraphicsError::InvalidHandle(id.to_string()))?;
        let range = byte_range(id, data.len(), offset, len)?;
        Ok(&mut data[range])
    }

    fn mip(&self, id: TextureId, mip_level: u32) -> Result<&[u8], GraphicsError> {
        self.textures
            .get(&id)
            .and_then(|mips| mips.get(mip_level as usize))
            .map(Vec::as_slice)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{id} mip {mip_level}")))
    }

    fn mip_mut(&mut self, id: TextureId, mip_level: u32) -> Result<&mut Vec<u8>, GraphicsError> {
        self.textures
            .get_mut(&id)
            .and_then(|mips| mips.get_mut(mip_level as usize))
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{id} mip {mip_level}")))
    }
}

fn byte_range(
    id: BufferId,
    size: usize,
    offset: u64,
    len: usize,
) -> Result<std::ops::Range<usize>, GraphicsError> {
    let start = usize::try_from(offset)
        .map_err(|_| GraphicsError::InvalidParameter(format!("offset {offset} of {id}")))?;
    match start.checked_add(len) {
        Some(end) if end <= size => Ok(start..end),
        _ => Err(GraphicsError::InvalidParameter(format!(
            "{len} bytes at {offset} exceed {id} ({size} bytes)"
        ))),
    }
}

/// Resources and invocation parameters visible to a [`Kernel`].
pub struct KernelContext<'a> {
    invocation: DispatchInvocation,
    layout: Option<&'a ProgramLayout>,
    bindings: &'a [Binding],
    state: &'a GraphicsState,
    registry: &'a ResourceRegistry,
    memory: &'a mut DeviceMemory,
}

impl KernelContext<'_> {
    /// Why the kernel runs.
    pub fn invocation(&self) -> DispatchInvocation {
        self.invocation
    }

    /// Fixed-function state at the time of the call.
    pub fn graphics_state(&self) -> &GraphicsState {
        self.state
    }

    /// Resource bound to `slot`, resolving names and indices through the
    /// program layout when one is known.
    pub fn binding(&self, slot: impl Into<BindingSlot>) -> Result<BoundResource, GraphicsError> {
        let slot = slot.into();
        if let Some(found) = self.bindings.iter().rev().find(|b| b.slot == slot) {
            return Ok(found.resource);
        }
        if let Some(decl) = self.layout.and_then(|layout| layout.find(&slot)) {
            let name = BindingSlot::Name(decl.name.clone());
            let index = BindingSlot::Index(decl.index);
            if let Some(found) = self
                .bindings
                .iter()
                .rev()
                .find(|b| b.slot == name || b.slot == index)
            {
                return Ok(found.resource);
            }
        }
        Err(GraphicsError::InvalidParameter(format!("binding {slot} is not bound")))
    }

    /// Copy of the bytes bound to a buffer slot.
    pub fn read_buffer(&self, slot: impl Into<BindingSlot>) -> Result<Vec<u8>, GraphicsError> {
        let (buffer, offset, len) = self.buffer_binding(slot.into())?;
        Ok(self.memory.buffer_range(buffer, offset, len)?.to_vec())
    }

    /// Read a plain-old-data value from the start of a buffer slot.
    pub fn read_pod<T: bytemuck::Pod>(
        &self,
        slot: impl Into<BindingSlot>,
    ) -> Result<T, GraphicsError> {
        let (buffer, offset, _) = self.buffer_binding(slot.into())?;
        let bytes = self
            .memory
            .buffer_range(buffer, offset, std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Write bytes into a buffer slot, relative to the bound offset.
    pub fn write_buffer(
        &mut self,
        slot: impl Into<BindingSlot>,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let (buffer, base, len) = self.buffer_binding(slot.into())?;
        if offset as usize + data.len() > len {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at {offset} exceeds the {len} bound bytes of {buffer}",
                data.len()
            )));
        }
        self.memory
            .buffer_range_mut(buffer, base + offset, data.len())?
            .copy_from_slice(data);
        Ok(())
    }

    /// Extent and format of the texture level behind an image or texture
    /// slot.
    pub fn image_info(
        &self,
        slot: impl Into<BindingSlot>,
    ) -> Result<(Extent3d, TextureFormat), GraphicsError> {
        let (texture, mip) = self.texture_binding(slot.into())?;
        let desc = self.registry.texture(texture)?;
        Ok((desc.mip_extent(mip), desc.format))
    }

    /// Copy of the texels behind an image or texture slot.
    pub fn read_image(&self, slot: impl Into<BindingSlot>) -> Result<Vec<u8>, GraphicsError> {
        let (texture, mip) = self.texture_binding(slot.into())?;
        Ok(self.memory.mip(texture, mip)?.to_vec())
    }

    /// Overwrite the texels behind an image slot.
    pub fn write_image(
        &mut self,
        slot: impl Into<BindingSlot>,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let slot = slot.into();
        let view = match self.binding(slot.clone())? {
            BoundResource::Image(view) => view,
            other => {
                return Err(GraphicsError::InvalidParameter(format!(
                    "binding {slot} holds {:?}, not a writable image",
                    other.kind()
                )));
            }
        };
        self.write_view(view, data)
    }

    /// View of color attachment `index` of the framebuffer being drawn to.
    pub fn color_attachment(&self, index: usize) -> Result<TextureViewId, GraphicsError> {
        let DispatchInvocation::Draw { framebuffer, .. } = self.invocation else {
            return Err(GraphicsError::InvalidParameter(
                "compute dispatch has no framebuffer".to_string(),
            ));
        };
        self.registry
            .framebuffer(framebuffer)?
            .color_attachments
            .get(index)
            .copied()
            .ok_or_else(|| {
                GraphicsError::InvalidParameter(format!(
                    "{framebuffer} has no color attachment {index}"
                ))
            })
    }

    /// Extent and format of a texture view.
    pub fn view_info(&self, view: TextureViewId) -> Result<(Extent3d, TextureFormat), GraphicsError> {
        let (_, mip, desc) = self.registry.texture_view_target(view)?;
        Ok((desc.mip_extent(mip), desc.format))
    }

    /// Copy of the texels behind a view.
    pub fn read_view(&self, view: TextureViewId) -> Result<Vec<u8>, GraphicsError> {
        let (texture, mip, _) = self.registry.texture_view_target(view)?;
        Ok(self.memory.mip(texture, mip)?.to_vec())
    }

    /// Overwrite the texels behind a view.
    pub fn write_view(&mut self, view: TextureViewId, data: &[u8]) -> Result<(), GraphicsError> {
        let (texture, mip, _) = self.registry.texture_view_target(view)?;
        let level = self.memory.mip_mut(texture, mip)?;
        if level.len() != data.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "{view} holds {} bytes, got {}",
                level.len(),
                data.len()
            )));
        }
        level.copy_from_slice(data);
        Ok(())
    }

    fn buffer_binding(&self, slot: BindingSlot) -> Result<(BufferId, u64, usize), GraphicsError> {
        let (buffer, offset, size) = match self.binding(slot.clone())? {
            BoundResource::Buffer {
                buffer,
                offset,
                size,
            } => (buffer, offset, size),
            BoundResource::VertexAttribute { buffer, offset, .. } => (buffer, offset, None),
            other => {
                return Err(GraphicsError::InvalidParameter(format!(
                    "binding {slot} holds {:?}, not a buffer",
                    other.kind()
                )));
            }
        };
        let total = self.registry.buffer(buffer)?.size;
        let len = size.unwrap_or(total.saturating_sub(offset));
        Ok((buffer, offset, len as usize))
    }

    fn texture_binding(&self, slot: BindingSlot) -> Result<(TextureId, u32), GraphicsError> {
        match self.binding(slot.clone())? {
            BoundResource::Texture(texture) => Ok((texture, 0)),
            BoundResource::Image(view) => {
                let (texture, mip, _) = self.registry.texture_view_target(view)?;
                Ok((texture, mip))
            }
            other => Err(GraphicsError::InvalidParameter(format!(
                "binding {slot} holds {:?}, not a texture",
                other.kind()
            ))),
        }
    }
}

#[derive(Debug, Default)]
struct ReplayState {
    program: Option<ProgramId>,
    bindings: Vec<Binding>,
    graphics: GraphicsState,
    framebuffer: Option<FramebufferId>,
}

/// CPU interpreter of recorded command buffers.
pub struct SoftwareBackend {
    config: SoftwareBackendConfig,
    registry: ResourceRegistry,
    memory: DeviceMemory,
    kernels: HashMap<ProgramId, Kernel>,
    signaled: HashSet<SyncPoint>,
    stats: BackendStats,
}

impl SoftwareBackend {
    /// Create a backend with default settings.
    pub fn new() -> Self {
        Self::with_config(SoftwareBackendConfig::default())
    }

    /// Create a backend with explicit settings.
    pub fn with_config(config: SoftwareBackendConfig) -> Self {
        log::debug!("SoftwareBackend: created with {:?}", config);
        Self {
            config,
            registry: ResourceRegistry::new(),
            memory: DeviceMemory::default(),
            kernels: HashMap::new(),
            signaled: HashSet::new(),
            stats: BackendStats::default(),
        }
    }

    /// Active settings.
    pub fn config(&self) -> &SoftwareBackendConfig {
        &self.config
    }

    /// Counters since creation or the last [`reset_stats`](Self::reset_stats).
    pub fn stats(&self) -> BackendStats {
        self.stats
    }

    /// Zero all counters.
    pub fn reset_stats(&mut self) {
        self.stats = BackendStats::default();
    }

    /// Bytes of resource memory in use.
    pub fn memory_used(&self) -> u64 {
        self.memory.used
    }

    /// Register a program without an implementation.
    ///
    /// Dispatching it fails; drawing with it only counts the draw.
    pub fn create_program(
        &mut self,
        descriptor: &ProgramDescriptor,
    ) -> Result<ProgramId, GraphicsError> {
        self.registry.create_program(descriptor)
    }

    /// Attach a CPU implementation to `program`, replacing any earlier one.
    pub fn register_kernel<F>(&mut self, program: ProgramId, kernel: F) -> Result<(), GraphicsError>
    where
        F: Fn(&mut KernelContext<'_>) -> Result<(), GraphicsError> + Send + Sync + 'static,
    {
        self.registry.program(program)?;
        self.kernels.insert(program, Arc::new(kernel));
        Ok(())
    }

    /// Register a program together with its implementation.
    pub fn create_kernel<F>(
        &mut self,
        descriptor: &ProgramDescriptor,
        kernel: F,
    ) -> Result<ProgramId, GraphicsError>
    where
        F: Fn(&mut KernelContext<'_>) -> Result<(), GraphicsError> + Send + Sync + 'static,
    {
        let program = self.create_program(descriptor)?;
        self.register_kernel(program, kernel)?;
        Ok(program)
    }

    /// Whole contents of a buffer.
    pub fn buffer_data(&self, buffer: BufferId) -> Result<&[u8], GraphicsError> {
        self.memory
            .buffers
            .get(&buffer)
            .map(Vec::as_slice)
            .ok_or_else(|| GraphicsError::InvalidHandle(buffer.to_string()))
    }

    /// Contents of one mip level of a texture.
    pub fn texture_data(&self, texture: TextureId, mip_level: u32) -> Result<&[u8], GraphicsError> {
        self.memory.mip(texture, mip_level)
    }

    /// Whether `point` has been signaled by a submitted buffer.
    pub fn is_signaled(&self, point: &SyncPoint) -> bool {
        self.signaled.contains(point)
    }

    fn reserve(&mut self, bytes: u64, what: &str) -> Result<(), GraphicsError> {
        let used = self.memory.used.checked_add(bytes).ok_or_else(|| {
            GraphicsError::OutOfMemory(format!("{what} needs {bytes} bytes"))
        })?;
        if let Some(budget) = self.config.memory_budget {
            if used > budget {
                log::warn!(
                    "SoftwareBackend: {what} of {bytes} bytes exceeds budget ({} of {budget} used)",
                    self.memory.used
                );
                return Err(GraphicsError::OutOfMemory(format!(
                    "{what} needs {bytes} bytes, {} of {budget} in use",
                    self.memory.used
                )));
            }
        }
        self.memory.used = used;
        Ok(())
    }

    /// Reserve `sizes` against the budget and allocate one zeroed block per
    /// entry. Nothing stays reserved on failure.
    fn allocate(&mut self, sizes: &[u64], what: &str) -> Result<Vec<Vec<u8>>, GraphicsError> {
        let bytes = sizes
            .iter()
            .try_fold(0u64, |total, &size| total.checked_add(size))
            .ok_or_else(|| GraphicsError::OutOfMemory(format!("{what} size overflows")))?;
        self.reserve(bytes, what)?;
        let blocks = sizes
            .iter()
            .map(|&size| zeroed(size, what))
            .collect::<Result<Vec<_>, _>>();
        if blocks.is_err() {
            self.memory.used -= bytes;
        }
        blocks
    }

    fn replay(&mut self, cmd: &CommandBuffer) -> Result<(), GraphicsError> {
        thistle_core::profile_scope!("software_replay");
        let label = cmd
            .label()
            .map(str::to_owned)
            .unwrap_or_else(|| cmd.id().to_string());
        let mut state = ReplayState {
            framebuffer: cmd.target(),
            ..ReplayState::default()
        };

        for command in cmd.commands() {
            log::trace!("SoftwareBackend: {label}: {}", command.label());
            match command {
                Command::SetProgram(program) => state.program = Some(*program),
                Command::SetBindings(bindings) => {
                    for binding in bindings {
                        state.bindings.retain(|b| b.slot != binding.slot);
                        state.bindings.push(binding.clone());
                    }
                }
                Command::SetState(graphics) => state.graphics = *graphics,
                Command::Dispatch { groups } => {
                    self.stats.dispatches += 1;
                    let invocation = DispatchInvocation::Compute { groups: *groups };
                    if !self.invoke(&label, &state, invocation)? {
                        return Err(GraphicsError::execution(
                            &label,
                            format!("no kernel registered for {:?}", state.program),
                        ));
                    }
                }
                Command::Draw(call) => {
                    self.stats.draws += 1;
                    let framebuffer = state.framebuffer.ok_or_else(|| {
                        GraphicsError::execution(&label, "draw without framebuffer")
                    })?;
                    let invocation = DispatchInvocation::Draw {
                        call: *call,
                        framebuffer,
                    };
                    if !self.invoke(&label, &state, invocation)? {
                        return Err(GraphicsError::execution(
                            &label,
                            format!("no kernel registered for {:?}", state.program),
                        ));
                    }
                }
                Command::CopyTexture { src, dst, regions } => {
                    self.stats.copies += 1;
                    for region in regions {
                        self.copy_region(*src, *dst, region)
                            .map_err(|e| GraphicsError::execution(&label, e.to_string()))?;
                    }
                }
                Command::FillBuffer {
                    buffer,
                    offset,
                    size,
                    value,
                } => {
                    self.stats.fills += 1;
                    let range = self
                        .memory
                        .buffer_range_mut(*buffer, *offset, *size as usize)
                        .map_err(|e| GraphicsError::execution(&label, e.to_string()))?;
                    let bytes = value.to_ne_bytes();
                    for chunk in range.chunks_exact_mut(4) {
                        chunk.copy_from_slice(&bytes);
                    }
                }
                Command::SetFramebuffer { framebuffer, loads } => {
                    self.stats.framebuffer_binds += 1;
                    let desc = self.registry.framebuffer(*framebuffer)?.clone();
                    self.apply_loads(&desc, loads)
                        .map_err(|e| GraphicsError::execution(&label, e.to_string()))?;
                    state.framebuffer = Some(*framebuffer);
                }
                Command::ExecuteCommandBuffer(nested) => {
                    self.stats.nested_executions += 1;
                    self.replay(nested)?;
                }
                Command::SignalSyncPoint(point) => {
                    self.stats.sync_signals += 1;
                    self.signaled.insert(point.clone());
                }
                Command::WaitSyncPoint(point) => {
                    self.stats.sync_waits += 1;
                    if self.config.strict_sync_points && !self.signaled.contains(point) {
                        return Err(GraphicsError::execution(
                            &label,
                            format!("sync point {point} was never signaled"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Run the kernel of the current program. Returns false if none is
    /// registered.
    fn invoke(
        &mut self,
        label: &str,
        state: &ReplayState,
        invocation: DispatchInvocation,
    ) -> Result<bool, GraphicsError> {
        let program = state
            .program
            .ok_or_else(|| GraphicsError::execution(label, "no program set"))?;
        let Some(kernel) = self.kernels.get(&program).cloned() else {
            return Ok(false);
        };
        let layout = self.registry.program(program)?.layout.as_ref();
        let mut ctx = KernelContext {
            invocation,
            layout,
            bindings: &state.bindings,
            state: &state.graphics,
            registry: &self.registry,
            memory: &mut self.memory,
        };
        kernel(&mut ctx).map_err(|e| GraphicsError::execution(label, e.to_string()))?;
        Ok(true)
    }

    fn copy_region(
        &mut self,
        src: TextureId,
        dst: TextureId,
        region: &TextureCopyRegion,
    ) -> Result<(), GraphicsError> {
        let src_desc = self.registry.texture(src)?;
        let dst_desc = self.registry.texture(dst)?;
        let texel = src_desc.format.block_size() as usize;
        let src_extent = src_desc.mip_extent(region.src_mip);
        let dst_extent = dst_desc.mip_extent(region.dst_mip);
        let row = region.size.width as usize * texel;
        let offset = |extent: Extent3d, x: u32, y: u32, z: u32| {
            ((z as usize * extent.height as usize + y as usize) * extent.width as usize
                + x as usize)
                * texel
        };

        let source = self.memory.mip(src, region.src_mip)?;
        let mut rows = Vec::with_capacity(row * (region.size.height * region.size.depth) as usize);
        for z in 0..region.size.depth {
            for y in 0..region.size.height {
                let o = region.src_origin;
                let start = offset(src_extent, o.x, o.y + y, o.z + z);
                rows.extend_from_slice(&source[start..start + row]);
            }
        }

        let target = self.memory.mip_mut(dst, region.dst_mip)?;
        let mut chunks = rows.chunks_exact(row);
        for z in 0..region.size.depth {
            for y in 0..region.size.height {
                let o = region.dst_origin;
                let start = offset(dst_extent, o.x, o.y + y, o.z + z);
                if let Some(chunk) = chunks.next() {
                    target[start..start + row].copy_from_slice(chunk);
                }
            }
        }
        Ok(())
    }

    fn apply_loads(
        &mut self,
        framebuffer: &FramebufferDescriptor,
        loads: &[AttachmentLoad],
    ) -> Result<(), GraphicsError> {
        for (view, load) in framebuffer.attachments().zip(loads) {
            let (texture, mip, desc) = self.registry.texture_view_target(view)?;
            let format = desc.format;
            let level = self.memory.mip_mut(texture, mip)?;
            match load {
                AttachmentLoad::Clear(value) => {
                    let texel = format.encode_color(value.as_rgba());
                    for chunk in level.chunks_exact_mut(texel.len()) {
                        chunk.copy_from_slice(&texel);
                    }
                }
                AttachmentLoad::Invalidate => level.fill(self.config.invalidate_pattern),
                AttachmentLoad::Reuse => {}
            }
        }
        Ok(())
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SoftwareBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareBackend")
            .field("config", &self.config)
            .field("memory_used", &self.memory.used)
            .field("kernels", &self.kernels.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Backend for SoftwareBackend {
    fn name(&self) -> &str {
        "Software"
    }

    fn submit(&mut self, command_buffer: &CommandBuffer, queue: QueueFlags) -> Result<(), GraphicsError> {
        let label = command_buffer
            .label()
            .map(str::to_owned)
            .unwrap_or_else(|| command_buffer.id().to_string());
        if !command_buffer.is_recorded() {
            return Err(GraphicsError::execution(label, "command buffer is not recorded"));
        }
        if queue.bits().count_ones() != 1 || !command_buffer.queues().contains(queue) {
            return Err(GraphicsError::execution(
                label,
                format!(
                    "cannot submit to {queue:?}, buffer supports {:?}",
                    command_buffer.queues()
                ),
            ));
        }
        if command_buffer.needs_graphics() && !queue.contains(QueueFlags::GRAPHICS) {
            return Err(GraphicsError::execution(label, "framebuffer work on a compute queue"));
        }
        log::trace!(
            "SoftwareBackend: submitting {} ({} commands) to {:?}",
            label,
            command_buffer.len(),
            queue
        );
        self.stats.submissions += 1;
        self.replay(command_buffer)
    }

    fn wait_idle(&mut self) -> Result<(), GraphicsError> {
        self.stats.idle_waits += 1;
        Ok(())
    }

    fn host_access(&mut self) -> &mut dyn HostAccess {
        self
    }
}

impl HostAccess for SoftwareBackend {
    fn read_buffer(&self, buffer: BufferId, offset: u64, dst: &mut [u8]) -> Result<(), GraphicsError> {
        dst.copy_from_slice(self.memory.buffer_range(buffer, offset, dst.len())?);
        Ok(())
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        self.memory
            .buffer_range_mut(buffer, offset, data.len())?
            .copy_from_slice(data);
        Ok(())
    }

    fn read_texture(
        &self,
        texture: TextureId,
        mip_level: u32,
        dst: &mut [u8],
    ) -> Result<(), GraphicsError> {
        let level = self.memory.mip(texture, mip_level)?;
        if level.len() != dst.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "{texture} mip {mip_level} holds {} bytes, destination has {}",
                level.len(),
                dst.len()
            )));
        }
        dst.copy_from_slice(level);
        Ok(())
    }

    fn write_texture(
        &mut self,
        texture: TextureId,
        mip_level: u32,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let level = self.memory.mip_mut(texture, mip_level)?;
        if level.len() != data.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "{texture} mip {mip_level} holds {} bytes, got {}",
                level.len(),
                data.len()
            )));
        }
        level.copy_from_slice(data);
        Ok(())
    }
}

impl ResourceAllocator for SoftwareBackend {
    fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    fn create_buffer(&mut self, descriptor: &BufferDescriptor) -> Result<BufferId, GraphicsError> {
        let label = format!("buffer {:?}", descriptor.label);
        let id = self.registry.create_buffer(descriptor)?;
        let data = match self.allocate(&[descriptor.size], &label) {
            Ok(mut blocks) => blocks.pop().unwrap_or_default(),
            Err(err) => {
                self.registry.destroy_buffer(id);
                return Err(err);
            }
        };
        log::trace!(
            "SoftwareBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        self.memory.buffers.insert(id, data);
        Ok(id)
    }

    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> Result<TextureId, GraphicsError> {
        let label = format!("texture {:?}", descriptor.label);
        let id = self.registry.create_texture(descriptor)?;
        let mips = (0..descriptor.mip_level_count)
            .map(|mip| descriptor.mip_byte_size(mip))
            .collect::<Option<Vec<u64>>>()
            .ok_or_else(|| GraphicsError::OutOfMemory(format!("{label} size overflows")))
            .and_then(|sizes| self.allocate(&sizes, &label));
        let mips = match mips {
            Ok(mips) => mips,
            Err(err) => {
                self.registry.destroy_texture(id);
                return Err(err);
            }
        };
        log::trace!(
            "SoftwareBackend: creating texture {:?} ({}x{}x{})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth
        );
        self.memory.textures.insert(id, mips);
        Ok(id)
    }

    fn create_texture_view(
        &mut self,
        texture: TextureId,
        mip_level: u32,
    ) -> Result<TextureViewId, GraphicsError> {
        self.registry.create_texture_view(texture, mip_level)
    }

    fn create_framebuffer(
        &mut self,
        descriptor: &FramebufferDescriptor,
    ) -> Result<FramebufferId, GraphicsError> {
        self.registry.create_framebuffer(descriptor)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) -> bool {
        if let Some(data) = self.memory.buffers.remove(&buffer) {
            self.memory.used -= data.len() as u64;
        }
        self.registry.destroy_buffer(buffer)
    }

    fn destroy_texture(&mut self, texture: TextureId) -> bool {
        if let Some(mips) = self.memory.textures.remove(&texture) {
            self.memory.used -= mips.iter().map(|m| m.len() as u64).sum::<u64>();
        }
        self.registry.destroy_texture(texture)
    }

    fn destroy_texture_view(&mut self, view: TextureViewId) -> bool {
        self.registry.destroy_texture_view(view)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) -> bool {
        self.registry.destroy_framebuffer(framebuffer)
    }
}

/// Zero-filled block of `size` bytes, failing instead of aborting when the
/// host cannot provide it.
fn zeroed(size: u64, what: &str) -> Result<Vec<u8>, GraphicsError> {
    let len = usize::try_from(size)
        .map_err(|_| GraphicsError::OutOfMemory(format!("{what} needs {size} bytes")))?;
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|err| GraphicsError::OutOfMemory(format!("{what}: {err}")))?;
    data.resize(len, 0);
    Ok(data)
}

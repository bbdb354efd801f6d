//! Frame runner.
//!
//! [`PresentTaskRunner`] takes the present task a producer handed out for the
//! current frame and executes it against a [`Backend`]:
//!
//! - CPU tasks call their callback with host access to resource memory.
//! - GPU tasks submit their command buffer to a compatible queue. Pass-through
//!   tasks are skipped.
//! - Groups run their members in the precomputed execution order. Before a
//!   member runs, the runner waits for the backend to go idle if one of the
//!   member's connected producers submitted GPU work since the last wait.
//!
//! The runner owns the task reference it is given and releases it when the
//! frame is done, whether or not execution succeeded.

use crate::backend::Backend;
use crate::command::{CommandBuffer, QueueFlags};
use crate::error::GraphicsError;
use crate::task::{PresentTask, SharedTask, TaskKind};

/// Runner settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Skip GPU tasks that would submit an empty command buffer.
    pub skip_pass_through: bool,
    /// Wait for the backend between a GPU producer and its consumer.
    pub wait_between_dependents: bool,
    /// Wait for the backend once the whole task has run.
    pub wait_at_frame_end: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            skip_pass_through: true,
            wait_between_dependents: true,
            wait_at_frame_end: false,
        }
    }
}

impl RunnerConfig {
    /// Submit pass-through tasks instead of skipping them.
    pub fn submit_pass_through(mut self) -> Self {
        self.skip_pass_through = false;
        self
    }

    /// Wait for the backend after the frame's task completes.
    pub fn with_frame_end_wait(mut self) -> Self {
        self.wait_at_frame_end = true;
        self
    }
}

/// One atomic task executed during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedTask {
    /// Task name.
    pub name: String,
    /// CPU or GPU.
    pub kind: TaskKind,
    /// Queue a GPU task was submitted to.
    pub queue: Option<QueueFlags>,
}

/// What happened during one [`PresentTaskRunner::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Executed atomic tasks in execution order.
    pub executed: Vec<ExecutedTask>,
    /// Names of skipped pass-through tasks.
    pub skipped: Vec<String>,
    /// Calls to [`Backend::wait_idle`].
    pub waits: usize,
}

impl RunReport {
    /// Number of command buffer submissions.
    pub fn submissions(&self) -> usize {
        self.executed
            .iter()
            .filter(|t| t.kind == TaskKind::Gpu)
            .count()
    }

    /// Names of executed tasks in order.
    pub fn executed_names(&self) -> Vec<&str> {
        self.executed.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Per-run bookkeeping. `epoch` advances on every wait, so a submission made
/// in the current epoch may still be in flight.
struct RunState<'a> {
    backend: &'a mut dyn Backend,
    report: RunReport,
    epoch: u64,
}

impl RunState<'_> {
    fn wait(&mut self) -> Result<(), GraphicsError> {
        self.backend.wait_idle()?;
        self.report.waits += 1;
        self.epoch += 1;
        Ok(())
    }
}

/// Executes present tasks frame by frame.
#[derive(Debug, Default)]
pub struct PresentTaskRunner {
    config: RunnerConfig,
    frames: u64,
    failed_frames: u64,
}

impl PresentTaskRunner {
    /// Runner with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner with explicit settings.
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Active settings.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Frames run so far, failed ones included.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames whose task failed.
    pub fn failed_frames(&self) -> u64 {
        self.failed_frames
    }

    /// Execute `task` and release it.
    ///
    /// A failure drops the frame's remaining work and is returned; the
    /// runner stays usable for the next frame.
    pub fn run(
        &mut self,
        task: SharedTask,
        backend: &mut dyn Backend,
    ) -> Result<RunReport, GraphicsError> {
        thistle_core::profile_function!();
        self.frames += 1;
        log::trace!(
            "Frame {}: running '{}' on {}",
            self.frames,
            task.name(),
            backend.name()
        );

        let mut state = RunState {
            backend,
            report: RunReport::default(),
            epoch: 0,
        };
        let result = self.execute(&task, &mut state).and_then(|submitted| {
            if self.config.wait_at_frame_end && submitted.is_some() {
                state.wait()?;
            }
            Ok(())
        });
        drop(task);
        thistle_core::frame_mark!();

        match result {
            Ok(()) => {
                thistle_core::profile_plot!("present_tasks", state.report.executed.len());
                Ok(state.report)
            }
            Err(err) => {
                self.failed_frames += 1;
                log::error!("Frame {} dropped: {}", self.frames, err);
                Err(err)
            }
        }
    }

    /// Run one task. Returns the epoch of the latest GPU submission it made.
    fn execute(
        &self,
        task: &PresentTask,
        state: &mut RunState<'_>,
    ) -> Result<Option<u64>, GraphicsError> {
        thistle_core::profile_scope_dynamic!(task.name());
        match task {
            PresentTask::Cpu(cpu) => {
                log::trace!("Running CPU task '{}'", task.name());
                cpu.invoke(state.backend.host_access())?;
                state.report.executed.push(ExecutedTask {
                    name: task.name().to_owned(),
                    kind: TaskKind::Cpu,
                    queue: None,
                });
                Ok(None)
            }
            PresentTask::Gpu(gpu) => {
                if self.config.skip_pass_through && gpu.is_pass_through() {
                    log::trace!("Skipping pass-through '{}'", task.name());
                    state.report.skipped.push(task.name().to_owned());
                    return Ok(None);
                }
                let queue = select_queue(gpu.command_buffer());
                log::trace!("Submitting '{}' to {:?}", task.name(), queue);
                state.backend.submit(gpu.command_buffer(), queue)?;
                state.report.executed.push(ExecutedTask {
                    name: task.name().to_owned(),
                    kind: TaskKind::Gpu,
                    queue: Some(queue),
                });
                Ok(Some(state.epoch))
            }
            PresentTask::Group(group) => {
                let mut submitted: Vec<Option<u64>> = vec![None; group.members().len()];
                let mut latest = None;
                for &member in group.execution_order() {
                    let pending = group
                        .producers_of(member)
                        .any(|producer| submitted[producer] == Some(state.epoch));
                    if pending && self.config.wait_between_dependents {
                        log::trace!(
                            "Group '{}': waiting before '{}'",
                            group.name(),
                            group.members()[member].name()
                        );
                        state.wait()?;
                    }
                    submitted[member] = self.execute(&group.members()[member], state)?;
                    if submitted[member].is_some() {
                        latest = submitted[member];
                    }
                }
                Ok(latest)
            }
        }
    }
}

/// Graphics when the buffer renders to a framebuffer, else compute when
/// allowed.
fn select_queue(command_buffer: &CommandBuffer) -> QueueFlags {
    if command_buffer.needs_graphics() || !command_buffer.queues().contains(QueueFlags::COMPUTE) {
        QueueFlags::GRAPHICS
    } else {
        QueueFlags::COMPUTE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::backend::HostAccess;
    use crate::command::CommandBufferDescriptor;
    use crate::resources::BufferId;
    use crate::task::{TaskGroupBuilder, TaskIo};
    use thistle_core::arena::Index;

    /// Records the order of submissions, waits and host writes.
    #[derive(Default)]
    struct TraceBackend {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl HostAccess for TraceBackend {
        fn read_buffer(&self, _: BufferId, _: u64, _: &mut [u8]) -> Result<(), GraphicsError> {
            Ok(())
        }

        fn write_buffer(&mut self, buffer: BufferId, _: u64, _: &[u8]) -> Result<(), GraphicsError> {
            self.events.lock().push(format!("write {buffer}"));
            Ok(())
        }

        fn read_texture(
            &self,
            _: crate::resources::TextureId,
            _: u32,
            _: &mut [u8],
        ) -> Result<(), GraphicsError> {
            Ok(())
        }

        fn write_texture(
            &mut self,
            _: crate::resources::TextureId,
            _: u32,
            _: &[u8],
        ) -> Result<(), GraphicsError> {
            Ok(())
        }
    }

    impl Backend for TraceBackend {
        fn name(&self) -> &str {
            "Trace"
        }

        fn submit(&mut self, cmd: &CommandBuffer, queue: QueueFlags) -> Result<(), GraphicsError> {
            self.events
                .lock()
                .push(format!("submit {} {:?}", cmd.label().unwrap_or("?"), queue));
            Ok(())
        }

        fn wait_idle(&mut self) -> Result<(), GraphicsError> {
            self.events.lock().push("wait".to_string());
            Ok(())
        }

        fn host_access(&mut self) -> &mut dyn HostAccess {
            self
        }
    }

    fn buffer(slot: u32) -> BufferId {
        BufferId::from_index(Index::from_raw_parts(slot, 0))
    }

    fn recorded(label: &str, queues: QueueFlags) -> Arc<CommandBuffer> {
        let registry = crate::resources::ResourceRegistry::new();
        let mut cmd = CommandBuffer::new(
            CommandBufferDescriptor::new()
                .with_label(label)
                .with_queues(queues),
        );
        let mut rec = cmd.start_recording(&registry, None).unwrap();
        rec.record_sync_point("keep_non_empty");
        rec.finish();
        Arc::new(cmd)
    }

    #[test]
    fn test_waits_only_between_gpu_producer_and_consumer() {
        let (a, b, c) = (buffer(0), buffer(1), buffer(2));
        let upload = PresentTask::cpu("upload", [], [TaskIo::from(a)], move |ctx| {
            ctx.write_buffer(a, 0, &[1])
        })
        .unwrap();
        let compute = PresentTask::gpu(
            "compute",
            recorded("compute", QueueFlags::COMPUTE),
            [TaskIo::from(a)],
            [TaskIo::from(b)],
        )
        .unwrap();
        let readback = PresentTask::gpu(
            "readback",
            recorded("readback", QueueFlags::all()),
            [TaskIo::from(b)],
            [TaskIo::from(c)],
        )
        .unwrap();

        let mut group = TaskGroupBuilder::new("frame");
        let m0 = group.add_member(upload);
        let m1 = group.add_member(compute);
        let m2 = group.add_member(readback);
        group.connect(m0, 0, m1, 0).connect(m1, 0, m2, 0);
        group.expose_output(c, m2, 0);
        let task = group.build().unwrap();

        let mut backend = TraceBackend::default();
        let events = Arc::clone(&backend.events);
        let report = PresentTaskRunner::new().run(task, &mut backend).unwrap();

        assert_eq!(
            *events.lock(),
            vec![
                format!("write {a}"),
                "submit compute COMPUTE".to_string(),
                "wait".to_string(),
                "submit readback COMPUTE".to_string(),
            ]
        );
        assert_eq!(report.executed_names(), vec!["upload", "compute", "readback"]);
        assert_eq!(report.submissions(), 2);
        assert_eq!(report.waits, 1);
    }

    #[test]
    fn test_pass_through_is_skipped_and_task_released() {
        let task = PresentTask::pass_through("cached", [TaskIo::from(buffer(4))]).unwrap();
        let held = Arc::clone(&task);
        let mut backend = TraceBackend::default();
        let events = Arc::clone(&backend.events);

        let mut runner = PresentTaskRunner::new();
        let report = runner.run(task, &mut backend).unwrap();
        assert_eq!(report.skipped, vec!["cached"]);
        assert!(report.executed.is_empty());
        assert!(events.lock().is_empty());
        assert_eq!(Arc::strong_count(&held), 1);
        assert_eq!(runner.frames(), 1);
    }

    #[test]
    fn test_failed_callback_drops_frame() {
        let task = PresentTask::cpu("broken", [], [], |ctx| {
            Err(GraphicsError::execution(ctx.name(), "simulated failure"))
        })
        .unwrap();
        let mut backend = TraceBackend::default();
        let mut runner = PresentTaskRunner::new();
        let err = runner.run(task, &mut backend).unwrap_err();
        assert_eq!(err, GraphicsError::execution("broken", "simulated failure"));
        assert_eq!(runner.failed_frames(), 1);
    }

    #[test]
    fn test_undeclared_write_is_rejected() {
        let declared = buffer(0);
        let other = buffer(1);
        let task = PresentTask::cpu("sneaky", [], [TaskIo::from(declared)], move |ctx| {
            ctx.write_buffer(other, 0, &[0])
        })
        .unwrap();
        let mut backend = TraceBackend::default();
        let err = PresentTaskRunner::new().run(task, &mut backend).unwrap_err();
        assert!(matches!(err, GraphicsError::Task(_)));
    }

    #[test]
    fn test_graphics_queue_selected_for_graphics_only_buffer() {
        let task = PresentTask::gpu(
            "ui",
            recorded("ui", QueueFlags::GRAPHICS),
            [],
            [TaskIo::from(buffer(3))],
        )
        .unwrap();
        let mut backend = TraceBackend::default();
        let report = PresentTaskRunner::with_config(RunnerConfig::default().with_frame_end_wait())
            .run(task, &mut backend)
            .unwrap();
        assert_eq!(report.executed[0].queue, Some(QueueFlags::GRAPHICS));
        assert_eq!(report.waits, 1);
    }
}

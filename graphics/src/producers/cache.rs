//! Per-frame choice between a full recompute and a pass-through.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::GraphicsError;
use crate::task::SharedTask;

/// A producer's two prebuilt present tasks and its dirty flag.
///
/// `with_compute` refreshes the producer's outputs; `without_compute`
/// declares the same outputs and does nothing, so downstream consumers keep
/// reading what the last recompute left behind.
pub struct CachedTaskPair {
    with_compute: SharedTask,
    without_compute: SharedTask,
    dirty: AtomicBool,
}

impl CachedTaskPair {
    /// Pair two tasks. The pair starts dirty so the first frame computes.
    ///
    /// Fails if the tasks do not declare the same inputs and outputs in the
    /// same order.
    pub fn new(with_compute: SharedTask, without_compute: SharedTask) -> Result<Self, GraphicsError> {
        if with_compute.inputs() != without_compute.inputs()
            || with_compute.outputs() != without_compute.outputs()
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "cached tasks '{}' and '{}' declare different IO",
                with_compute.name(),
                without_compute.name()
            )));
        }
        Ok(Self {
            with_compute,
            without_compute,
            dirty: AtomicBool::new(true),
        })
    }

    /// Request a recompute on the next [`present_task`](Self::present_task).
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Whether the next frame recomputes.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Task to run this frame.
    ///
    /// Returns a new reference to the full task and clears the flag when
    /// dirty, otherwise a new reference to the pass-through.
    pub fn present_task(&self) -> SharedTask {
        if self.dirty.swap(false, Ordering::AcqRel) {
            log::trace!("Cache: '{}' is dirty, recomputing", self.with_compute.name());
            Arc::clone(&self.with_compute)
        } else {
            Arc::clone(&self.without_compute)
        }
    }

    /// Full recompute task.
    pub fn with_compute(&self) -> &SharedTask {
        &self.with_compute
    }

    /// Pass-through task.
    pub fn without_compute(&self) -> &SharedTask {
        &self.without_compute
    }
}

impl std::fmt::Debug for CachedTaskPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedTaskPair")
            .field("with_compute", &self.with_compute.name())
            .field("without_compute", &self.without_compute.name())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::TextureId;
    use crate::task::{PresentTask, TaskIo, TaskKind};
    use thistle_core::arena::Index;

    fn output() -> TaskIo {
        TextureId::from_index(Index::from_raw_parts(0, 0)).into()
    }

    fn pair() -> CachedTaskPair {
        let full = PresentTask::cpu("full", [], [output()], |_| Ok(())).unwrap();
        let cached = PresentTask::pass_through("cached", [output()]).unwrap();
        CachedTaskPair::new(full, cached).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let pair = pair();

        // First frame computes, then the flag stays clear.
        assert_eq!(pair.present_task().kind(), TaskKind::Cpu);
        assert!(!pair.is_dirty());
        assert!(pair.present_task().is_pass_through());

        pair.mark_dirty();
        assert_eq!(pair.present_task().name(), "full");
        assert_eq!(pair.present_task().name(), "cached");
    }

    #[test]
    fn test_returned_reference_is_fresh() {
        let pair = pair();
        let before = Arc::strong_count(pair.with_compute());
        let task = pair.present_task();
        assert_eq!(Arc::strong_count(pair.with_compute()), before + 1);
        drop(task);
        assert_eq!(Arc::strong_count(pair.with_compute()), before);
    }

    #[test]
    fn test_mismatched_io_rejected() {
        let full = PresentTask::cpu("full", [], [output()], |_| Ok(())).unwrap();
        let cached = PresentTask::pass_through("cached", []).unwrap();
        assert!(CachedTaskPair::new(full, cached).is_err());

        let input: TaskIo = TextureId::from_index(Index::from_raw_parts(1, 0)).into();
        let full = PresentTask::cpu("full", [input], [output()], |_| Ok(())).unwrap();
        let cached = PresentTask::pass_through("cached", [output()]).unwrap();
        assert!(CachedTaskPair::new(full, cached).is_err());
    }
}

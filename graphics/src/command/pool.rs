//! Bounded command buffer allocation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::GraphicsError;

use super::{CommandBuffer, CommandBufferDescriptor};

/// Hands out command buffers, optionally capped at a fixed number alive at
/// once.
///
/// Each allocated buffer carries a slot that is returned to the pool when the
/// buffer is dropped, including when it was shared through an `Arc` and the
/// last task holding it goes away.
#[derive(Debug, Clone)]
pub struct CommandBufferPool {
    capacity: Option<usize>,
    live: Arc<AtomicUsize>,
}

impl CommandBufferPool {
    /// Pool with no limit.
    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pool allowing at most `capacity` live buffers.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Allocate an empty buffer, failing with
    /// [`GraphicsError::OutOfMemory`] when the pool is full.
    pub fn allocate(
        &self,
        descriptor: CommandBufferDescriptor,
    ) -> Result<CommandBuffer, GraphicsError> {
        let capacity = self.capacity;
        let reserved = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| match capacity {
                Some(cap) if live >= cap => None,
                _ => Some(live + 1),
            });
        if reserved.is_err() {
            log::warn!(
                "Command buffer pool exhausted ({} live)",
                self.live.load(Ordering::Acquire)
            );
            return Err(GraphicsError::OutOfMemory(format!(
                "command buffer pool capacity {} reached",
                capacity.unwrap_or(usize::MAX)
            )));
        }
        let slot = PoolSlot {
            live: Arc::clone(&self.live),
        };
        Ok(CommandBuffer::with_slot(descriptor, Some(slot)))
    }

    /// Buffers currently alive.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Maximum number of live buffers, if bounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl Default for CommandBufferPool {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Returns one unit of capacity to its pool on drop.
#[derive(Debug)]
pub(crate) struct PoolSlot {
    live: Arc<AtomicUsize>,
}

impl Drop for PoolSlot {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

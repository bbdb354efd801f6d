//! Graphics error types.

use thiserror::Error;

use crate::command::CommandError;
use crate::task::{GroupError, TaskError};

/// Errors that can occur in the graphics system.
///
/// Construction and recording functions return these instead of panicking;
/// a caller building a frame drops the failing task and carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// An allocator ran out of room (command buffers, resources).
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    /// A handle did not resolve to a live resource.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Command buffer recording was rejected.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// Atomic present task construction was rejected.
    #[error(transparent)]
    Task(#[from] TaskError),
    /// Present task group construction was rejected.
    #[error(transparent)]
    Group(#[from] GroupError),
    /// A backend failed while executing a task.
    #[error("execution of '{task}' failed: {reason}")]
    ExecutionFailed {
        /// Name of the failing task.
        task: String,
        /// Backend-provided reason.
        reason: String,
    },
}

impl GraphicsError {
    /// Shorthand for [`GraphicsError::ExecutionFailed`].
    pub fn execution(task: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            task: task.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory("command buffer pool exhausted".to_string());
        assert_eq!(err.to_string(), "out of memory: command buffer pool exhausted");

        let err = GraphicsError::execution("metaball_dispatch", "kernel missing");
        assert_eq!(
            err.to_string(),
            "execution of 'metaball_dispatch' failed: kernel missing"
        );
    }

    #[test]
    fn test_wrapped_errors_are_transparent() {
        let err: GraphicsError = CommandError::NotInvokable.into();
        assert_eq!(err.to_string(), CommandError::NotInvokable.to_string());
    }
}

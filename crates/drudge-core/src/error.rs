use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::WorkerState;

/// Any error a task body wants to surface.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of a single task execution.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task's own budget elapsed before it finished.
    /// The operation itself keeps running detached.
    #[error("task did not finish within {0:?}")]
    Timeout(Duration),

    /// The task stopped because it observed a cancellation.
    #[error("task was cancelled")]
    Cancelled,

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(BoxError),
}

impl TaskError {
    pub fn failed<E: Into<BoxError>>(error: E) -> Self {
        Self::Failed(error.into())
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into().into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("cannot enqueue a missing task")]
    MissingTask,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("worker cannot be started from state {0:?}")]
    AlreadyStarted(WorkerState),

    #[error("start was cancelled before the worker loop was scheduled")]
    StartCancelled,

    #[error("worker loop panicked: {0}")]
    LoopPanicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("smtp unavailable")]
    struct SmtpDown;

    #[test]
    fn failed_keeps_the_wrapped_error() {
        let err = TaskError::failed(SmtpDown);
        assert_eq!(err.to_string(), "smtp unavailable");
        match err {
            TaskError::Failed(inner) => assert!(inner.is::<SmtpDown>()),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn classification_helpers() {
        assert!(TaskError::Timeout(Duration::from_millis(5)).is_timeout());
        assert!(TaskError::Cancelled.is_cancelled());
        assert!(!TaskError::msg("nope").is_timeout());
        assert!(!TaskError::Panicked("x".into()).is_cancelled());
    }
}

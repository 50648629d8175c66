//! Queue module: the queue port and its in-memory implementation.

mod memory;

pub use memory::InMemoryQueue;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{QueueError, TaskError};
use crate::task::SharedTask;

/// Queue port (interface).
///
/// Design intent:
/// - Producers call `enqueue` from any thread, sync or async, without extra locking.
/// - Workers call `dequeue`; each item is handed to exactly one caller.
/// - `run_task` is the execution primitive both worker flavors share.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Append a task to the tail. `None` is rejected and leaves the queue untouched.
    fn enqueue(&self, task: Option<SharedTask>) -> Result<(), QueueError>;

    /// Remove and return the head, or `None` when empty.
    fn dequeue(&self) -> Option<SharedTask>;

    /// Number of tasks waiting. Tasks already handed out are not counted.
    fn count(&self) -> usize;

    /// Execute one task with timeout enforcement and failure reporting.
    async fn run_task(&self, task: SharedTask, cancel: &CancellationToken) -> Result<(), TaskError>;
}

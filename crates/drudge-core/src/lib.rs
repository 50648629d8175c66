//! drudge-core
//!
//! Background task execution for work that should not run on the request path
//! (sending mail, invoking scheduled jobs, ...).
//!
//! # Modules
//! - **task**: the task contract (`BackgroundTask`, `FnTask`)
//! - **queue**: `Queue` port + `InMemoryQueue`
//! - **runner**: runs one task with its timeout budget and reports failures
//! - **worker**: `SequentialWorker`, one task at a time
//! - **pool**: `PoolWorker`, up to N tasks at a time
//! - **lifecycle**: `HostedService` start/stop contract and `WorkerState`
//! - **config**: queue/worker configuration and the raw `WorkerSettings`
//! - **sink**: `ExceptionSink`, where reported failures go
//! - **error**: error types
//!
//! # Example
//! ```ignore
//! let queue = Arc::new(InMemoryQueue::new(QueueConfig::new().with_sink(TracingSink)));
//! queue.push(SendWelcomeMail { to: "new@member.example".into() });
//!
//! let worker = SequentialWorker::new(queue.clone(), WorkerConfig::default());
//! worker.start(CancellationToken::new()).await?;
//! // ...
//! worker.stop(CancellationToken::new()).await?;
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod queue;
pub mod runner;
pub mod sink;
pub mod task;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{PoolConfig, QueueConfig, WorkerConfig, WorkerSettings};
pub use error::{BoxError, QueueError, TaskError, WorkerError};
pub use lifecycle::{HostedService, WorkerState};
pub use pool::PoolWorker;
pub use queue::{InMemoryQueue, Queue};
pub use sink::{ExceptionSink, TracingSink};
pub use task::{BackgroundTask, FnTask, SharedTask};
pub use worker::SequentialWorker;

// re-exported so callers don't need a direct tokio-util dependency
pub use tokio_util::sync::CancellationToken;

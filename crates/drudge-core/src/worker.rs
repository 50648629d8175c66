use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::lifecycle::{HostedService, Lifecycle, WorkerState, idle};
use crate::queue::Queue;

/// Drains the queue one task at a time.
///
/// - Tasks complete in enqueue order (unless one fails or outruns its budget).
/// - Stopping does not abort the task in flight; it receives the stopping token
///   as its cancellation input and decides for itself.
pub struct SequentialWorker {
    queue: Arc<dyn Queue>,
    config: WorkerConfig,
    lifecycle: Lifecycle,
}

impl SequentialWorker {
    pub fn new(queue: Arc<dyn Queue>, config: WorkerConfig) -> Self {
        Self {
            queue,
            config,
            lifecycle: Lifecycle::new(),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }
}

#[async_trait]
impl HostedService for SequentialWorker {
    async fn start(&self, cancel: CancellationToken) -> Result<(), WorkerError> {
        let queue = Arc::clone(&self.queue);
        let config = self.config;
        self.lifecycle
            .start(&cancel, move |stopping| drain_sequentially(queue, config, stopping))?;
        info!(
            poll_queue_delay_ms = config.poll_queue_delay().as_millis() as u64,
            "sequential worker started"
        );
        Ok(())
    }

    async fn stop(&self, cancel: CancellationToken) -> Result<(), WorkerError> {
        self.lifecycle.stop(&cancel).await
    }

    fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }
}

async fn drain_sequentially(queue: Arc<dyn Queue>, config: WorkerConfig, stopping: CancellationToken) {
    while !stopping.is_cancelled() {
        let Some(task) = queue.dequeue() else {
            if !idle(&stopping, config.poll_queue_delay()).await {
                break;
            }
            continue;
        };

        // already reported by the runner
        if let Err(err) = queue.run_task(task, &stopping).await {
            debug!(error = %err, "task failed; moving on");
        }
    }
    info!(pending = queue.count(), "sequential worker stopped");
}

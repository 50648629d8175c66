//! Bounded-concurrency worker pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::error::WorkerError;
use crate::lifecycle::{HostedService, Lifecycle, WorkerState};
use crate::queue::Queue;

/// Drains the queue with up to `max_concurrent_count` tasks running at once.
///
/// Admission is FIFO; completion order is whatever the tasks' durations make it.
/// Every admitted task gets the pool's stopping token as its cancellation input.
/// When the pool stops, tasks still running are left to finish on their own.
pub struct PoolWorker {
    queue: Arc<dyn Queue>,
    config: PoolConfig,
    in_flight: Arc<AtomicUsize>,
    lifecycle: Lifecycle,
}

impl PoolWorker {
    pub fn new(queue: Arc<dyn Queue>, config: PoolConfig) -> Self {
        Self {
            queue,
            config,
            in_flight: Arc::new(AtomicUsize::new(0)),
            lifecycle: Lifecycle::new(),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Executions currently running. Never exceeds the configured ceiling.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostedService for PoolWorker {
    async fn start(&self, cancel: CancellationToken) -> Result<(), WorkerError> {
        let queue = Arc::clone(&self.queue);
        let gauge = Arc::clone(&self.in_flight);
        let config = self.config;
        self.lifecycle.start(&cancel, move |stopping| {
            drain_concurrently(queue, config, gauge, stopping)
        })?;
        info!(
            max_concurrent_count = config.max_concurrent_count(),
            poll_queue_delay_ms = config.poll_queue_delay().as_millis() as u64,
            "worker pool started"
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

async fn drain_concurrently(
    queue: Arc<dyn Queue>,
    config: PoolConfig,
    gauge: Arc<AtomicUsize>,
    stopping: CancellationToken,
) {
    // JoinSet の len は回収前の完了済みも含むので、上限判定は常に保守的になる
    let mut running: JoinSet<()> = JoinSet::new();

    while !stopping.is_cancelled() {
        while running.try_join_next().is_some() {}

        if running.len() < config.max_concurrent_count()
            && let Some(task) = queue.dequeue()
        {
            let queue = Arc::clone(&queue);
            let gauge = Arc::clone(&gauge);
            let token = stopping.clone();
            gauge.fetch_add(1, Ordering::SeqCst);
            running.spawn(async move {
                // already reported by the runner
                if let Err(err) = queue.run_task(task, &token).await {
                    debug!(error = %err, "task failed; slot released");
                }
                gauge.fetch_sub(1, Ordering::SeqCst);
            });
            // let the admitted task (and everyone else) run before the next admission
            tokio::task::yield_now().await;
            continue;
        }

        tokio::select! {
            _ = stopping.cancelled() => break,
            _ = tokio::time::sleep(config.poll_queue_delay()) => {}
            Some(_) = running.join_next(), if !running.is_empty() => {}
        }
    }

    let detached = running.len();
    // in-flight tasks keep running; dropping the set would abort them
    running.detach_all();
    info!(detached, pending = queue.count(), "worker pool stopped");
}

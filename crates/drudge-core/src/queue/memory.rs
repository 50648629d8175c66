//! In-memory queue implementation.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::config::QueueConfig;
use crate::error::{QueueError, TaskError};
use crate::queue::Queue;
use crate::runner;
use crate::task::{BackgroundTask, SharedTask};

/// In-memory FIFO of pending tasks.
///
/// Nothing is persisted: whatever is still queued when the process exits is lost.
/// The lock is only held for the push/pop itself, never across an await.
#[derive(Default)]
pub struct InMemoryQueue {
    pending: Mutex<VecDeque<SharedTask>>,
    config: QueueConfig,
}

impl InMemoryQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Typed enqueue. Cannot hit the missing-task rejection.
    pub fn push<T: BackgroundTask + 'static>(&self, task: T) {
        self.push_shared(Arc::new(task));
    }

    pub fn push_shared(&self, task: SharedTask) {
        let depth = {
            let mut pending = self.pending.lock();
            pending.push_back(task);
            pending.len()
        };
        trace!(depth, "task enqueued");
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    fn enqueue(&self, task: Option<SharedTask>) -> Result<(), QueueError> {
        let task = task.ok_or(QueueError::MissingTask)?;
        self.push_shared(task);
        Ok(())
    }

    fn dequeue(&self) -> Option<SharedTask> {
        self.pending.lock().pop_front()
    }

    fn count(&self) -> usize {
        self.pending.lock().len()
    }

    async fn run_task(&self, task: SharedTask, cancel: &CancellationToken) -> Result<(), TaskError> {
        runner::run_task(task, cancel, self.config.on_exception()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSink, counting_task, logging_task};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn enqueue_and_count() {
        let queue = InMemoryQueue::default();
        let hits = Arc::new(AtomicUsize::new(0));

        queue.enqueue(Some(counting_task(&hits))).unwrap();
        queue.enqueue(Some(counting_task(&hits))).unwrap();

        assert_eq!(queue.count(), 2);
        assert!(!queue.is_empty());
    }

    #[test]
    fn missing_task_is_rejected_and_count_unchanged() {
        let queue = InMemoryQueue::default();
        let hits = Arc::new(AtomicUsize::new(0));
        queue.enqueue(Some(counting_task(&hits))).unwrap();

        let err = queue.enqueue(None).unwrap_err();

        assert_eq!(err, QueueError::MissingTask);
        assert_eq!(queue.count(), 1);
    }

    #[test]
    fn dequeue_on_empty_returns_none() {
        let queue = InMemoryQueue::default();
        assert!(queue.dequeue().is_none());
        assert_eq!(queue.count(), 0);
    }

    #[tokio::test]
    async fn dequeue_is_fifo() {
        let queue = InMemoryQueue::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        for id in 0..5 {
            queue.enqueue(Some(logging_task(id, &log))).unwrap();
        }

        let cancel = CancellationToken::new();
        while let Some(task) = queue.dequeue() {
            queue.run_task(task, &cancel).await.unwrap();
        }

        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_and_consumers_neither_lose_nor_duplicate() {
        let queue = Arc::new(InMemoryQueue::default());
        let log = Arc::new(Mutex::new(Vec::new()));

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    for i in 0..250 {
                        queue.push_shared(logging_task(p * 1000 + i, &log));
                        if i % 50 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();

        let taken = Arc::new(AtomicUsize::new(0));
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let taken = Arc::clone(&taken);
                tokio::spawn(async move {
                    let cancel = CancellationToken::new();
                    while taken.load(Ordering::SeqCst) < 1000 {
                        match queue.dequeue() {
                            Some(task) => {
                                taken.fetch_add(1, Ordering::SeqCst);
                                queue.run_task(task, &cancel).await.unwrap();
                            }
                            None => tokio::time::sleep(Duration::from_millis(1)).await,
                        }
                    }
                })
            })
            .collect();

        for p in producers {
            p.await.unwrap();
        }
        for c in consumers {
            c.await.unwrap();
        }

        let log = log.lock();
        assert_eq!(log.len(), 1000);
        let unique: HashSet<_> = log.iter().copied().collect();
        assert_eq!(unique.len(), 1000);
        assert_eq!(queue.count(), 0);
    }

    #[tokio::test]
    async fn run_task_reports_through_configured_sink() {
        let sink = RecordingSink::new();
        let queue = InMemoryQueue::new(QueueConfig::new().with_sink(sink.clone()));
        queue.push(crate::task::FnTask::new(|_| async { Err(TaskError::msg("render failed")) }));

        let task = queue.dequeue().unwrap();
        let err = queue.run_task(task, &CancellationToken::new()).await.unwrap_err();

        assert_eq!(err.to_string(), "render failed");
        assert_eq!(sink.messages(), vec!["render failed".to_string()]);
    }
}

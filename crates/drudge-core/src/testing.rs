//! Test helpers shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::sink::ExceptionSink;
use crate::task::{BackgroundTask, FnTask, SharedTask};

/// Sink that remembers what it was told.
#[derive(Clone, Default)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<String>>>,
    timeouts: Arc<AtomicUsize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn timeouts(&self) -> usize {
        self.timeouts.load(Ordering::SeqCst)
    }
}

impl ExceptionSink for RecordingSink {
    fn report(&self, error: &TaskError) {
        if error.is_timeout() {
            self.timeouts.fetch_add(1, Ordering::SeqCst);
        }
        self.messages.lock().push(error.to_string());
    }
}

/// Increments `hits` and returns.
pub fn counting_task(hits: &Arc<AtomicUsize>) -> SharedTask {
    let hits = Arc::clone(hits);
    Arc::new(FnTask::new(move |_| {
        let hits = Arc::clone(&hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }))
}

/// Appends `id` to `log` and returns.
pub fn logging_task(id: usize, log: &Arc<Mutex<Vec<usize>>>) -> SharedTask {
    let log = Arc::clone(log);
    Arc::new(FnTask::new(move |_| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push(id);
            Ok(())
        }
    }))
}

/// Waits on the cancellation token and reports it as `Cancelled`.
pub fn waits_for_shutdown(started: &Arc<AtomicUsize>) -> SharedTask {
    let started = Arc::clone(started);
    Arc::new(FnTask::new(move |cancel: CancellationToken| {
        let started = Arc::clone(&started);
        async move {
            started.fetch_add(1, Ordering::SeqCst);
            cancel.cancelled().await;
            Err(TaskError::Cancelled)
        }
    }))
}

pub struct PanickingTask {
    message: &'static str,
    timeout: Option<Duration>,
}

impl PanickingTask {
    pub fn new(message: &'static str) -> Self {
        Self {
            message,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl BackgroundTask for PanickingTask {
    async fn run(&self, _cancel: CancellationToken) -> Result<(), TaskError> {
        panic!("{}", self.message)
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

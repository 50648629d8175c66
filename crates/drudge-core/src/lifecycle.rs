//! Hosted lifecycle shared by both worker flavors.
//!
//! State transitions:
//! - NotStarted -> Running (start)
//! - Running -> Stopping (stop requested) -> Stopped (loop observed it)
//! - NotStarted -> Stopped (stop before start)

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::WorkerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

/// The "managed long-running process" contract a host drives.
#[async_trait]
pub trait HostedService: Send + Sync {
    /// Schedule the worker loop and return without waiting for it.
    /// A token that is already cancelled aborts the start.
    async fn start(&self, cancel: CancellationToken) -> Result<(), WorkerError>;

    /// Signal the loop to stop and wait until it has observed the signal.
    /// Cancelling `cancel` gives up waiting; the loop still stops on its own.
    async fn stop(&self, cancel: CancellationToken) -> Result<(), WorkerError>;

    fn state(&self) -> WorkerState;
}

struct Inner {
    state: WorkerState,
    handle: Option<JoinHandle<Result<(), String>>>,
}

/// Owns the stopping token and the spawned loop.
///
/// Dropping it cancels the stopping token, so a worker that goes out of scope
/// without `stop` does not leave its loop behind.
pub(crate) struct Lifecycle {
    inner: Arc<Mutex<Inner>>,
    stopping: CancellationToken,
    // fired once the state is Stopped
    exited: CancellationToken,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: WorkerState::NotStarted,
                handle: None,
            })),
            stopping: CancellationToken::new(),
            exited: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> WorkerState {
        self.inner.lock().state
    }

    pub(crate) fn start<F, Fut>(&self, cancel: &CancellationToken, run: F) -> Result<(), WorkerError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if inner.state != WorkerState::NotStarted {
            return Err(WorkerError::AlreadyStarted(inner.state));
        }
        if cancel.is_cancelled() {
            return Err(WorkerError::StartCancelled);
        }

        let fut = run(self.stopping.clone());
        let shared = Arc::clone(&self.inner);
        let exited = self.exited.clone();
        // start がロックを持ったまま spawn するので、Running より先に Stopped が書かれることはない
        inner.handle = Some(tokio::spawn(async move {
            let outcome = AssertUnwindSafe(fut)
                .catch_unwind()
                .await
                .map_err(|payload| {
                    payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string())
                });
            if let Err(msg) = &outcome {
                error!(panic = %msg, "worker loop panicked");
            }
            shared.lock().state = WorkerState::Stopped;
            exited.cancel();
            outcome
        }));
        inner.state = WorkerState::Running;
        Ok(())
    }

    pub(crate) async fn stop(&self, cancel: &CancellationToken) -> Result<(), WorkerError> {
        let handle = {
            let mut inner = self.inner.lock();
            match inner.state {
                WorkerState::NotStarted => {
                    inner.state = WorkerState::Stopped;
                    self.stopping.cancel();
                    self.exited.cancel();
                    return Ok(());
                }
                WorkerState::Running => inner.state = WorkerState::Stopping,
                // a loop that already died may still hold a panic to report
                WorkerState::Stopping | WorkerState::Stopped => {}
            }
            self.stopping.cancel();
            inner.handle.take()
        };

        // 別の stop がすでに handle を持っている: ループの終了だけ待つ
        let Some(mut handle) = handle else {
            tokio::select! {
                _ = self.exited.cancelled() => {}
                _ = cancel.cancelled() => debug!("stop gave up waiting for the worker loop"),
            }
            return Ok(());
        };

        tokio::select! {
            joined = &mut handle => join_outcome(joined),
            _ = cancel.cancelled() => {
                debug!("stop gave up waiting for the worker loop");
                Ok(())
            }
        }
    }
}

fn join_outcome(
    joined: Result<Result<(), String>, tokio::task::JoinError>,
) -> Result<(), WorkerError> {
    match joined {
        Ok(Err(msg)) => Err(WorkerError::LoopPanicked(msg)),
        _ => Ok(()),
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.stopping.cancel();
    }
}

/// Idle between polls. Returns `false` once the stopping token fires.
pub(crate) async fn idle(stopping: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = stopping.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

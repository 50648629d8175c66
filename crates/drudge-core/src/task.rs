//! Task contract: the unit of deferred work.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// A piece of work that runs outside the request path.
///
/// Design:
/// - `run` receives the owning worker's stopping token. Honoring it is up to the task.
/// - `timeout` is a soft budget. When it elapses the runner stops waiting and reports
///   a timeout, but the operation is never cancelled because of it.
///
/// ```ignore
/// struct SendWelcomeMail { to: String }
///
/// #[async_trait]
/// impl BackgroundTask for SendWelcomeMail {
///     async fn run(&self, cancel: CancellationToken) -> Result<(), TaskError> {
///         mailer.send(&self.to, &cancel).await.map_err(TaskError::failed)
///     }
/// }
/// ```
#[async_trait]
pub trait BackgroundTask: Send + Sync {
    async fn run(&self, cancel: CancellationToken) -> Result<(), TaskError>;

    /// `None` means no budget: the runner waits as long as it takes.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// Tasks are immutable once enqueued, so they are shared rather than cloned.
pub type SharedTask = Arc<dyn BackgroundTask>;

/// Adapts a closure into a [`BackgroundTask`].
pub struct FnTask<F> {
    op: F,
    timeout: Option<Duration>,
}

impl<F, Fut> FnTask<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    pub fn new(op: F) -> Self {
        Self { op, timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl<F, Fut> BackgroundTask for FnTask<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn run(&self, cancel: CancellationToken) -> Result<(), TaskError> {
        (self.op)(cancel).await
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

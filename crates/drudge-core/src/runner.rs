//! Execution runner: runs one task with its timeout budget and reports failures.
//!
//! Both worker flavors go through [`run_task`], so timeout and reporting
//! behave the same regardless of how the task was obtained.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TaskError;
use crate::sink::ExceptionSink;
use crate::task::SharedTask;

/// Execute one task.
///
/// - No budget: the operation is awaited in place.
/// - With a budget: the operation is spawned and raced against a timer. When the
///   timer wins, the operation is left running detached and `TaskError::Timeout`
///   is returned.
///
/// Every failure is handed to `sink` exactly once and then returned unchanged.
/// The one exception is a `TaskError::Cancelled` produced while `cancel` is
/// cancelled: that is host shutdown, which is returned but never reported.
pub async fn run_task(
    task: SharedTask,
    cancel: &CancellationToken,
    sink: Option<&dyn ExceptionSink>,
) -> Result<(), TaskError> {
    let result = match task.timeout() {
        None => run_in_place(&task, cancel).await,
        Some(budget) => run_with_budget(task, cancel, budget).await,
    };

    let Err(err) = result else {
        return Ok(());
    };

    if err.is_cancelled() && cancel.is_cancelled() {
        debug!("task stopped by shutdown");
        return Err(err);
    }

    if let Some(sink) = sink {
        sink.report(&err);
    }
    Err(err)
}

async fn run_in_place(task: &SharedTask, cancel: &CancellationToken) -> Result<(), TaskError> {
    match AssertUnwindSafe(task.run(cancel.clone())).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
    }
}

async fn run_with_budget(
    task: SharedTask,
    cancel: &CancellationToken,
    budget: Duration,
) -> Result<(), TaskError> {
    let token = cancel.clone();
    let mut handle = tokio::spawn(async move { task.run(token).await });

    tokio::select! {
        biased;
        joined = &mut handle => match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(TaskError::Panicked(panic_message(e.into_panic().as_ref()))),
            // runtime is shutting down underneath us
            Err(_) => Err(TaskError::Cancelled),
        },
        _ = tokio::time::sleep(budget) => {
            // handle を drop するだけ: タスク自体は止めない
            warn!(budget_ms = budget.as_millis() as u64, "task exceeded its timeout; no longer waiting for it");
            Err(TaskError::Timeout(budget))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

//! Exception sink: where reported task failures go.

use crate::error::TaskError;

/// Receives every reported execution failure, once per failure.
///
/// Any `Fn(&TaskError)` closure is a sink, so hosts can plug in whatever
/// reporting they already have.
pub trait ExceptionSink: Send + Sync {
    fn report(&self, error: &TaskError);
}

impl<F> ExceptionSink for F
where
    F: Fn(&TaskError) + Send + Sync,
{
    fn report(&self, error: &TaskError) {
        self(error)
    }
}

/// Logs each failure as a `tracing` error event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ExceptionSink for TracingSink {
    fn report(&self, error: &TaskError) {
        tracing::error!(error = %error, timeout = error.is_timeout(), "background task failed");
    }
}

//! Error sinks for failures that have no caller to return to.

use tracing::error;

use crate::Error;

/// Receives errors from operations that do not return them, like logout.
pub trait ErrorSink: Send + Sync {
    /// Handle one error.
    fn report(&self, err: &Error);
}

impl<F> ErrorSink for F
where
    F: Fn(&Error) + Send + Sync,
{
    fn report(&self, err: &Error) {
        self(err);
    }
}

/// Sink that writes errors to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, err: &Error) {
        error!("{err}");
    }
}

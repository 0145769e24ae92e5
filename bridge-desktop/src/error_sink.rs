//! Error sink that forwards terminal failures to `tracing`

use bridge_traits::error_sink::{ErrorContext, ErrorKind, ErrorSink};
use tracing::error;

/// Logs every reported failure at `error` level under the
/// `waveline::errors` target.
#[derive(Debug, Clone, Default)]
pub struct TracingErrorSink;

impl TracingErrorSink {
    pub fn new() -> Self {
        Self
    }
}

impl ErrorSink for TracingErrorSink {
    fn report(&self, kind: ErrorKind, context: ErrorContext) {
        error!(
            target: "waveline::errors",
            kind = %kind,
            track_id = context.track_id.as_deref().unwrap_or("-"),
            attempts = ?context.attempts,
            cause = ?context.cause,
            "{}",
            context.message
        );
    }
}

use std::error::Error as _;

use tracing::warn;

use crate::error::HttpError;

/// Receives the failures that are deliberately kept out of the view state.
pub trait FailureSink: Send + Sync {
    fn load_more_failed(&self, query: &str, page: u32, error: &HttpError);
}

/// Records non-fatal failures as `warn` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl FailureSink for TracingSink {
    fn load_more_failed(&self, query: &str, page: u32, error: &HttpError) {
        warn!(
            query,
            page,
            kind = error.kind(),
            error = %error,
            cause = ?error.source(),
            "Loading more results failed"
        );
    }
}

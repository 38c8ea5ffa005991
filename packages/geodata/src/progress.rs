//! Progress reporting for paginated fetches.
//!
//! Library code reports through [`ProgressCallback`]; the binary decides
//! whether that becomes an `indicatif` bar or nothing at all.

use std::sync::Arc;

/// Receives progress updates from a long-running fetch.
///
/// Must be `Send + Sync` so one reporter can be shared with the
/// catchment worker thread.
pub trait ProgressCallback: Send + Sync {
    /// Sets the expected number of units (pages, results).
    fn set_total(&self, total: u64);

    /// Advances by `delta` units.
    fn inc(&self, delta: u64);

    /// Replaces the status message.
    fn set_message(&self, msg: String);

    /// Marks the work as done with a final message.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

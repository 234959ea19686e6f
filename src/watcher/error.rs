//! Error types for the polling watcher.

use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::options::ValidationError;
use crate::scanner::ScanError;
use crate::storage::StorageError;

/// Errors from watcher lifecycle calls and poll iterations.
///
/// Lifecycle variants are returned to callers of `start`, `stop` and
/// `set_options`. The wrapped scan, storage and dispatch errors only surface
/// from [`poll_once`](super::Watcher::poll_once); the poll loop logs them
/// and tries again on the next cycle.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Watcher '{parser_name}' is already running")]
    AlreadyRunning { parser_name: String },

    #[error("Watcher is not running")]
    NotRunning,

    #[error("Watcher options are not configured")]
    OptionsNotConfigured,

    #[error("Invalid watcher options: {0}")]
    InvalidOptions(#[from] ValidationError),

    #[error("No async runtime available to run the poll loop")]
    RuntimeUnavailable,

    #[error("Scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("Watermark storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Hand-off failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Scan task failed: {reason}")]
    TaskFailed { reason: String },
}

impl WatchError {
    /// Whether the error came from a poll iteration rather than a lifecycle
    /// or configuration mistake.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WatchError::Scan(_)
                | WatchError::Storage(_)
                | WatchError::Dispatch(_)
                | WatchError::TaskFailed { .. }
        )
    }
}

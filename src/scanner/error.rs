//! Error types for directory scanning.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::WatcherVariant;

/// Errors raised while listing directories for new files.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Cannot read directory {path}: {reason}")]
    ReadDir { path: PathBuf, reason: String },

    #[error("Cannot read metadata for {path}: {reason}")]
    Metadata { path: PathBuf, reason: String },

    #[error("Filesystem does not report {variant} timestamps for {path}")]
    TimestampUnavailable {
        path: PathBuf,
        variant: WatcherVariant,
    },
}

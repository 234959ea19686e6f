//! Error types for handing files to the processing pipeline.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Dispatch queue is closed")]
    Closed,

    #[error("Queue rejected {count} files: {reason}")]
    Rejected { count: usize, reason: String },

    #[error("Step '{step}' failed for {path}: {reason}")]
    StepFailed {
        step: &'static str,
        path: PathBuf,
        reason: String,
    },
}

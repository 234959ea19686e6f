//! Hand-off of discovered files to the processing pipeline.
//!
//! A watcher submits a [`ProcessingChain`] plus the files it found and moves
//! on. What happens to each file afterwards (stage, parse, backup, cleanup,
//! optional source delete) belongs to the queue.

mod chain;
mod error;
mod local;
mod parser;

pub use chain::{ChainStep, ProcessingChain};
pub use error::DispatchError;
pub use local::LocalFileQueue;
pub use parser::{CommandParser, FileParser, LogParser};

use async_trait::async_trait;

use crate::types::FileDescriptor;

/// Receives batches of discovered files.
///
/// Implementations must return once the batch is accepted; the watcher waits
/// for this call but never for the pipeline itself.
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    async fn enqueue(
        &self,
        chain: ProcessingChain,
        files: Vec<FileDescriptor>,
    ) -> Result<(), DispatchError>;
}

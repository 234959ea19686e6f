//! Polling file watcher that hands newly arrived files to parser plugins.
//!
//! Each registered parser watches one directory (optionally its immediate
//! subdirectories) and remembers the newest creation or write time it has
//! dispatched. Every poll picks up files strictly newer than that watermark,
//! advances it, and submits the batch to a [`dispatch::DispatchQueue`].

pub mod config;
pub mod dispatch;
pub mod logging;
pub mod options;
pub mod registry;
pub mod scanner;
pub mod storage;
pub mod types;
pub mod watcher;

pub use config::Settings;
pub use dispatch::{DispatchQueue, FileParser, LocalFileQueue, ProcessingChain};
pub use options::{ValidationError, WatcherOptions};
pub use registry::{ParserRegistry, RegistryError};
pub use storage::{JsonWatermarkStore, MemoryWatermarkStore, WatermarkStore};
pub use types::{FileDescriptor, ParserHandle, Ticks, WatcherVariant};
pub use watcher::{WatchError, Watcher, WatcherStatus};

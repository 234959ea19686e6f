//! Watermark persistence.
//!
//! One watermark per (watcher variant, parser name) records the newest file
//! timestamp a watcher has already handed off. Stores only ever move it
//! forward.

pub mod error;
mod json;
mod memory;
mod watermark;

pub use error::{StorageError, StorageResult};
pub use json::JsonWatermarkStore;
pub use memory::MemoryWatermarkStore;
pub use watermark::{Watermark, WatermarkStore};

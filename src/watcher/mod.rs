//! Polling file watchers.
//!
//! A watcher owns one parser's options and runs a poll loop on its own task:
//!
//! ```text
//! loop {
//!     watermark = store.get_or_create(variant, parser)
//!     files     = checker.find_candidate_files(options, watermark)
//!     if !files.is_empty() {
//!         store.advance(variant, parser, max(files.timestamp))
//!         queue.enqueue(chain, files)
//!     }
//!     sleep(polling_interval) or stop
//! }
//! ```
//!
//! Errors inside an iteration are logged and retried on the next cycle.
//! The two variants only differ in their [`FileChecker`].

mod checker;
mod error;
mod polling;

pub use checker::{CreationTimeChecker, FileChecker, WriteTimeChecker, checker_for};
pub use error::WatchError;
pub use polling::{PollOutcome, Watcher, WatcherStatus};

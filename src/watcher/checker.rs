//! Per-variant strategy for finding candidate files.

use std::sync::Arc;

use crate::options::CompiledOptions;
use crate::scanner::{DirectoryScanner, ScanError};
use crate::types::{FileDescriptor, Ticks, WatcherVariant};

/// Finds files that are newer than a watermark.
///
/// This is the only part of a watcher that differs between variants: which
/// timestamp is compared, and therefore which watermark row is used.
pub trait FileChecker: Send + Sync {
    fn variant(&self) -> WatcherVariant;

    fn find_candidate_files(
        &self,
        options: &CompiledOptions,
        watermark: Ticks,
    ) -> Result<Vec<FileDescriptor>, ScanError>;
}

/// Picks up files whose creation time is past the watermark.
#[derive(Debug, Clone)]
pub struct CreationTimeChecker {
    scanner: DirectoryScanner,
}

impl CreationTimeChecker {
    pub fn new(scanner: DirectoryScanner) -> Self {
        Self { scanner }
    }
}

impl FileChecker for CreationTimeChecker {
    fn variant(&self) -> WatcherVariant {
        WatcherVariant::CreationTime
    }

    fn find_candidate_files(
        &self,
        options: &CompiledOptions,
        watermark: Ticks,
    ) -> Result<Vec<FileDescriptor>, ScanError> {
        self.scanner
            .scan_options(options, WatcherVariant::CreationTime, watermark)
    }
}

/// Picks up files whose last write time is past the watermark, so files
/// that receive new data are processed again.
#[derive(Debug, Clone)]
pub struct WriteTimeChecker {
    scanner: DirectoryScanner,
}

impl WriteTimeChecker {
    pub fn new(scanner: DirectoryScanner) -> Self {
        Self { scanner }
    }
}

impl FileChecker for WriteTimeChecker {
    fn variant(&self) -> WatcherVariant {
        WatcherVariant::WriteTime
    }

    fn find_candidate_files(
        &self,
        options: &CompiledOptions,
        watermark: Ticks,
    ) -> Result<Vec<FileDescriptor>, ScanError> {
        self.scanner
            .scan_options(options, WatcherVariant::WriteTime, watermark)
    }
}

/// The checker for a variant, scanning through `scanner`.
pub fn checker_for(variant: WatcherVariant, scanner: DirectoryScanner) -> Arc<dyn FileChecker> {
    match variant {
        WatcherVariant::CreationTime => Arc::new(CreationTimeChecker::new(scanner)),
        WatcherVariant::WriteTime => Arc::new(WriteTimeChecker::new(scanner)),
    }
}

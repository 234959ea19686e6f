//! Polling scanner that turns a directory tree and a watermark into new files.
//!
//! The scanner never follows more than one level of subdirectories and never
//! touches the watermark or the filesystem contents. It only lists and
//! filters.
//!
//! ```text
//! root/
//!   a1/   <- scanned when its name matches the subdirectory pattern
//!   a2/
//!   b1/   <- skipped
//!   x.txt <- scanned unless a subdirectory pattern is set and
//!            check_main_directory is false
//! ```

mod error;
mod fs;
mod memory;

pub use error::ScanError;
pub use fs::{DirEntryInfo, FileSystem, LocalFileSystem};
pub use memory::MemoryFileSystem;

use std::path::Path;
use std::sync::Arc;

use regex::Regex;

use crate::options::CompiledOptions;
use crate::types::{FileDescriptor, Ticks, WatcherVariant};

/// Finds files in scope whose relevant timestamp is past a watermark.
#[derive(Clone)]
pub struct DirectoryScanner {
    fs: Arc<dyn FileSystem>,
}

impl std::fmt::Debug for DirectoryScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryScanner").finish_non_exhaustive()
    }
}

impl DirectoryScanner {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Scanner over the local disk.
    pub fn local() -> Self {
        Self::new(Arc::new(LocalFileSystem::new()))
    }

    /// Scan using the patterns and root-directory rule of a watcher's options.
    pub fn scan_options(
        &self,
        options: &CompiledOptions,
        variant: WatcherVariant,
        watermark: Ticks,
    ) -> Result<Vec<FileDescriptor>, ScanError> {
        self.scan(
            &options.options().directory_to_watch,
            options.file_pattern(),
            options.subdirectory_pattern(),
            options.options().scans_main_directory(),
            variant,
            watermark,
        )
    }

    /// Collect every file under `root` that qualifies against `watermark`.
    ///
    /// Matching subdirectories are scanned first, then the root itself when
    /// `include_root` is set or no subdirectory pattern is given. Results are
    /// ordered by timestamp, then path.
    pub fn scan(
        &self,
        root: &Path,
        file_pattern: &Regex,
        subdirectory_pattern: Option<&Regex>,
        include_root: bool,
        variant: WatcherVariant,
        watermark: Ticks,
    ) -> Result<Vec<FileDescriptor>, ScanError> {
        let mut found = Vec::new();

        let root_entries = self.fs.list_dir(root)?;

        if let Some(subdirectory_pattern) = subdirectory_pattern {
            for dir in root_entries
                .iter()
                .filter(|e| e.is_dir && subdirectory_pattern.is_match(&e.name))
            {
                let entries = self.fs.list_dir(&dir.path)?;
                let before = found.len();
                collect_new_files(&entries, file_pattern, variant, watermark, &mut found)?;
                tracing::trace!(
                    "[scanner] {} new files in {}",
                    found.len() - before,
                    dir.path.display()
                );
            }
        }

        if include_root || subdirectory_pattern.is_none() {
            let before = found.len();
            collect_new_files(&root_entries, file_pattern, variant, watermark, &mut found)?;
            tracing::trace!(
                "[scanner] {} new files in {}",
                found.len() - before,
                root.display()
            );
        }

        found.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.path.cmp(&b.path)));
        Ok(found)
    }
}

fn collect_new_files(
    entries: &[DirEntryInfo],
    file_pattern: &Regex,
    variant: WatcherVariant,
    watermark: Ticks,
    found: &mut Vec<FileDescriptor>,
) -> Result<(), ScanError> {
    for entry in entries
        .iter()
        .filter(|e| !e.is_dir && file_pattern.is_match(&e.name))
    {
        let timestamp = entry
            .timestamp(variant)
            .ok_or_else(|| ScanError::TimestampUnavailable {
                path: entry.path.clone(),
                variant,
            })?;

        if timestamp > watermark {
            found.push(FileDescriptor {
                path: entry.path.clone(),
                name: entry.name.clone(),
                timestamp,
            });
        }
    }
    Ok(())
}

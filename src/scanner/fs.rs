//! Read-only filesystem access used by the scanner.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::ScanError;
use crate::types::{Ticks, WatcherVariant};

/// One immediate child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
    pub created: Option<Ticks>,
    pub modified: Option<Ticks>,
}

impl DirEntryInfo {
    /// The timestamp the given watcher variant compares against.
    pub fn timestamp(&self, variant: WatcherVariant) -> Option<Ticks> {
        match variant {
            WatcherVariant::CreationTime => self.created,
            WatcherVariant::WriteTime => self.modified,
        }
    }
}

/// Lists the immediate children of a directory.
pub trait FileSystem: Send + Sync {
    fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntryInfo>, ScanError>;
}

/// The local disk, listed one level deep.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for LocalFileSystem {
    fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntryInfo>, ScanError> {
        let mut entries = Vec::new();

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true);

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // Removed between listing and stat
                    if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound)
                        && e.depth() > 0
                    {
                        continue;
                    }
                    return Err(ScanError::ReadDir {
                        path: dir.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            };

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {
                    continue;
                }
                Err(e) => {
                    return Err(ScanError::Metadata {
                        path: entry.path().to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            };

            entries.push(DirEntryInfo {
                path: entry.path().to_path_buf(),
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: metadata.is_dir(),
                created: metadata.created().ok().map(Ticks::from_system_time),
                modified: metadata.modified().ok().map(Ticks::from_system_time),
            });
        }

        Ok(entries)
    }
}

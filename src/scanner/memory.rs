//! In-memory filesystem for tests and dry runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use super::{DirEntryInfo, FileSystem, ScanError};
use crate::types::Ticks;

#[derive(Debug, Clone, Copy)]
struct MemoryEntry {
    is_dir: bool,
    created: Option<Ticks>,
    modified: Option<Ticks>,
}

/// A directory tree held in memory with explicit timestamps.
///
/// Parent directories must be added before their children are listed.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    entries: RwLock<BTreeMap<PathBuf, MemoryEntry>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        self.entries.write().insert(
            path.into(),
            MemoryEntry {
                is_dir: true,
                created: None,
                modified: None,
            },
        );
    }

    /// Add a file whose creation and write times are both `at`.
    pub fn add_file(&self, path: impl Into<PathBuf>, at: Ticks) {
        self.add_file_with_times(path, Some(at), Some(at));
    }

    pub fn add_file_with_times(
        &self,
        path: impl Into<PathBuf>,
        created: Option<Ticks>,
        modified: Option<Ticks>,
    ) {
        self.entries.write().insert(
            path.into(),
            MemoryEntry {
                is_dir: false,
                created,
                modified,
            },
        );
    }

    /// Update the write time of an existing file.
    pub fn touch(&self, path: &Path, modified: Ticks) -> bool {
        match self.entries.write().get_mut(path) {
            Some(entry) if !entry.is_dir => {
                entry.modified = Some(modified);
                true
            }
            _ => false,
        }
    }
}

impl FileSystem for MemoryFileSystem {
    fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntryInfo>, ScanError> {
        let entries = self.entries.read();

        match entries.get(dir) {
            Some(entry) if entry.is_dir => {}
            _ => {
                return Err(ScanError::ReadDir {
                    path: dir.to_path_buf(),
                    reason: "directory not found".to_string(),
                });
            }
        }

        Ok(entries
            .iter()
            .filter(|(path, _)| path.parent() == Some(dir))
            .map(|(path, entry)| DirEntryInfo {
                path: path.clone(),
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                is_dir: entry.is_dir,
                created: entry.created,
                modified: entry.modified,
            })
            .collect())
    }
}

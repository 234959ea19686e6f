//! Durable watermark store backed by a single JSON document.
//!
//! Every mutation rewrites the document through a temp file in the same
//! directory and renames it over the old one. The in-memory copy is only
//! replaced after the rename succeeds, so a failed write leaves both the
//! file and the served values at their previous state. The write itself runs
//! on the blocking pool; readers wait on the table lock, never on a worker
//! thread stuck in `fsync`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use super::watermark::WatermarkTable;
use super::{StorageError, StorageResult, Watermark, WatermarkStore};
use crate::types::{Ticks, WatcherVariant};

const FILE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct WatermarkFile {
    version: u32,
    #[serde(default)]
    watermarks: WatermarkTable,
}

/// Watermarks persisted to a JSON file on disk.
#[derive(Debug)]
pub struct JsonWatermarkStore {
    path: PathBuf,
    table: Mutex<WatermarkTable>,
}

impl JsonWatermarkStore {
    /// Open the store at `path`, loading existing watermarks if the file
    /// exists. The file is created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let table = if path.exists() {
            let json = fs::read_to_string(&path).map_err(|e| StorageError::Io {
                path: path.clone(),
                source: e,
            })?;
            let file: WatermarkFile = serde_json::from_str(&json)?;
            if file.version != FILE_VERSION {
                return Err(StorageError::UnsupportedVersion {
                    found: file.version,
                    expected: FILE_VERSION,
                });
            }
            file.watermarks
        } else {
            WatermarkTable::default()
        };

        crate::debug_event!("storage", "opened", "{}", path.display());

        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the table and persist it if it reports a
    /// change. Only a successful write is committed.
    async fn mutate<F>(&self, change: F) -> StorageResult<Watermark>
    where
        F: FnOnce(&mut WatermarkTable) -> (Watermark, bool) + Send,
    {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let (row, changed) = change(&mut next);

        if changed {
            let path = self.path.clone();
            *table = tokio::task::spawn_blocking(move || write_file(&path, &next).map(|()| next))
                .await
                .map_err(|e| StorageError::WriteTask(e.to_string()))??;
        }

        Ok(row)
    }
}

fn write_file(path: &Path, table: &WatermarkTable) -> StorageResult<()> {
    let io_err = |source: std::io::Error| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(io_err)?;

    let file = WatermarkFile {
        version: FILE_VERSION,
        watermarks: table.clone(),
    };
    let json = serde_json::to_string_pretty(&file)?;

    let mut temp = NamedTempFile::new_in(parent).map_err(io_err)?;
    temp.write_all(json.as_bytes()).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;

    Ok(())
}

#[async_trait]
impl WatermarkStore for JsonWatermarkStore {
    async fn get(
        &self,
        variant: WatcherVariant,
        parser_name: &str,
    ) -> StorageResult<Option<Watermark>> {
        Ok(self.table.lock().await.get(variant, parser_name))
    }

    async fn create(&self, variant: WatcherVariant, parser_name: &str) -> StorageResult<Watermark> {
        self.mutate(|table| table.create(variant, parser_name)).await
    }

    async fn advance(
        &self,
        variant: WatcherVariant,
        parser_name: &str,
        ticks: Ticks,
    ) -> StorageResult<Watermark> {
        self.mutate(|table| table.advance(variant, parser_name, ticks))
            .await
    }

    async fn list(&self) -> StorageResult<Vec<Watermark>> {
        Ok(self.table.lock().await.list())
    }
}

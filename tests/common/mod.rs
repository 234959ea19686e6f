#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use parsewatch::dispatch::{DispatchError, DispatchQueue, LogParser, ProcessingChain};
use parsewatch::scanner::{DirEntryInfo, DirectoryScanner, FileSystem, MemoryFileSystem, ScanError};
use parsewatch::storage::{MemoryWatermarkStore, WatermarkStore};
use parsewatch::watcher::{Watcher, checker_for};
use parsewatch::{FileDescriptor, WatcherOptions, WatcherVariant};

/// One accepted hand-off.
#[derive(Debug)]
pub struct Batch {
    pub parser_name: String,
    pub files: Vec<FileDescriptor>,
}

impl Batch {
    pub fn names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Forwards every batch to a channel instead of processing it.
pub struct ChannelQueue {
    tx: mpsc::UnboundedSender<Batch>,
}

pub type BatchReceiver = mpsc::UnboundedReceiver<Batch>;

pub fn channel_queue() -> (Arc<ChannelQueue>, BatchReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelQueue { tx }), rx)
}

#[async_trait]
impl DispatchQueue for ChannelQueue {
    async fn enqueue(
        &self,
        chain: ProcessingChain,
        files: Vec<FileDescriptor>,
    ) -> Result<(), DispatchError> {
        self.tx
            .send(Batch {
                parser_name: chain.parser_name,
                files,
            })
            .map_err(|_| DispatchError::Closed)
    }
}

/// Refuses every batch.
pub struct RejectingQueue;

#[async_trait]
impl DispatchQueue for RejectingQueue {
    async fn enqueue(
        &self,
        _chain: ProcessingChain,
        files: Vec<FileDescriptor>,
    ) -> Result<(), DispatchError> {
        Err(DispatchError::Rejected {
            count: files.len(),
            reason: "queue is full".to_string(),
        })
    }
}

/// Holds every hand-off until `release` is notified.
#[derive(Default)]
pub struct BlockingQueue {
    pub entered: Notify,
    pub release: Notify,
    pub finished: AtomicBool,
}

#[async_trait]
impl DispatchQueue for BlockingQueue {
    async fn enqueue(
        &self,
        _chain: ProcessingChain,
        _files: Vec<FileDescriptor>,
    ) -> Result<(), DispatchError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails the first `failures` listings, then defers to a memory filesystem.
pub struct FlakyFileSystem {
    pub inner: Arc<MemoryFileSystem>,
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyFileSystem {
    pub fn new(inner: Arc<MemoryFileSystem>, failures: usize) -> Self {
        Self {
            inner,
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FileSystem for FlakyFileSystem {
    fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntryInfo>, ScanError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(ScanError::ReadDir {
                path: dir.to_path_buf(),
                reason: "device not ready".to_string(),
            });
        }
        self.inner.list_dir(dir)
    }
}

/// Options with the minimum polling interval and throwaway work folders.
pub fn options(name: &str, dir: impl AsRef<Path>, pattern: &str) -> WatcherOptions {
    WatcherOptions::new(name, dir.as_ref(), pattern, "/tmp/pw-work", "/tmp/pw-backup")
}

pub fn watcher(
    variant: WatcherVariant,
    fs: Arc<dyn FileSystem>,
    store: Arc<dyn WatermarkStore>,
    queue: Arc<dyn DispatchQueue>,
) -> Watcher {
    Watcher::new(
        checker_for(variant, DirectoryScanner::new(fs)),
        store,
        queue,
        Arc::new(LogParser),
    )
}

/// A memory filesystem with `/data` already present.
pub fn memory_fs() -> Arc<MemoryFileSystem> {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_dir("/data");
    fs
}

pub fn memory_store() -> Arc<MemoryWatermarkStore> {
    Arc::new(MemoryWatermarkStore::new())
}

/// Wait for the next batch, failing the test after a few seconds.
pub async fn next_batch(rx: &mut BatchReceiver) -> Batch {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a hand-off")
        .expect("queue channel closed")
}

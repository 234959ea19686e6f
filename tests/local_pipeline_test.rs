//! Write-time watching on a real directory, through the local queue and
//! the JSON watermark store.

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetime::{FileTime, set_file_mtime};
use tempfile::TempDir;

use common::{channel_queue, watcher};
use parsewatch::config::QueueConfig;
use parsewatch::dispatch::LogParser;
use parsewatch::scanner::LocalFileSystem;
use parsewatch::{
    JsonWatermarkStore, LocalFileQueue, ParserRegistry, Ticks, WatcherOptions, WatcherVariant,
    WatermarkStore,
};

const WT: WatcherVariant = WatcherVariant::WriteTime;
const SECOND: i64 = 1_000_000_000;

fn set_mtime(path: &Path, secs: i64) {
    set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect()
}

#[tokio::test]
async fn test_new_file_runs_through_the_whole_pipeline() {
    let temp = TempDir::new().unwrap();
    let incoming = temp.path().join("incoming");
    let work = temp.path().join("work");
    let backup = temp.path().join("backup");
    let state = temp.path().join("state").join("watermarks.json");
    fs::create_dir_all(&incoming).unwrap();

    let hello = incoming.join("hello1.txt");
    let world = incoming.join("world.txt");
    fs::write(&hello, "hello").unwrap();
    fs::write(&world, "world").unwrap();
    set_mtime(&hello, 1_600_000_000);
    set_mtime(&world, 1_600_000_000);

    let store = Arc::new(JsonWatermarkStore::open(&state).unwrap());
    let queue = Arc::new(LocalFileQueue::new(QueueConfig {
        max_attempts: 2,
        retry_delay_ms: 10,
        max_concurrent_files: 2,
        settle_delay_ms: 20,
    }));
    let registry = ParserRegistry::builder()
        .file_system(Arc::new(LocalFileSystem::new()))
        .store(store)
        .queue(queue.clone())
        .build()
        .unwrap();

    let handle = registry
        .register(
            WT,
            WatcherOptions::new("invoices", &incoming, "^hello", &work, &backup)
                .with_delete_source(true),
            Arc::new(LogParser),
        )
        .unwrap();

    let outcome = registry
        .get(handle)
        .unwrap()
        .poll_once()
        .await
        .unwrap();
    assert_eq!(outcome.files.len(), 1);
    assert_eq!(outcome.current, Ticks::new(1_600_000_000 * SECOND));

    queue.drain().await;

    // Source deleted, untouched neighbour kept, working folder cleaned up
    assert!(!hello.exists());
    assert!(world.exists());
    assert!(files_under(&work).is_empty());

    let backups = files_under(&backup);
    assert_eq!(backups.len(), 1);
    assert!(backups[0].ends_with("hello1.txt"));
    assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "hello");

    // Watermark survives a restart
    let reopened = JsonWatermarkStore::open(&state).unwrap();
    let mark = reopened.get(WT, "invoices").await.unwrap().unwrap();
    assert_eq!(mark.last_seen, Ticks::new(1_600_000_000 * SECOND));
}

#[tokio::test]
async fn test_rewritten_file_is_picked_up_again() {
    let temp = TempDir::new().unwrap();
    let report = temp.path().join("report.csv");
    fs::write(&report, "a,b").unwrap();
    set_mtime(&report, 1_600_000_000);

    let store = Arc::new(JsonWatermarkStore::open(temp.path().join("state.json")).unwrap());
    let (queue, mut rx) = channel_queue();
    let w = watcher(WT, Arc::new(LocalFileSystem::new()), store, queue);
    w.set_options(common::options("reports", temp.path(), r"\.csv$"))
        .unwrap();

    w.poll_once().await.unwrap();
    assert_eq!(rx.try_recv().unwrap().names(), vec!["report.csv"]);

    // Same mtime again: nothing new
    assert!(w.poll_once().await.unwrap().files.is_empty());

    fs::write(&report, "a,b\nc,d").unwrap();
    set_mtime(&report, 1_600_000_060);
    w.poll_once().await.unwrap();
    assert_eq!(rx.try_recv().unwrap().names(), vec!["report.csv"]);

    // Rolling the mtime back never rewinds the watermark
    set_mtime(&report, 1_500_000_000);
    let outcome = w.poll_once().await.unwrap();
    assert!(outcome.files.is_empty());
    assert_eq!(outcome.current, Ticks::new(1_600_000_060 * SECOND));
}

#[tokio::test]
async fn test_parsed_files_in_subdirectories() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("drops");
    for dir in ["2024-01", "2024-02", "archive"] {
        fs::create_dir_all(root.join(dir)).unwrap();
    }
    for (dir, secs) in [("2024-01", 1_700_000_000), ("2024-02", 1_700_000_100), ("archive", 1_700_000_200)] {
        let path = root.join(dir).join("drop.dat");
        fs::write(&path, dir).unwrap();
        set_mtime(&path, secs);
    }
    let top = root.join("top.dat");
    fs::write(&top, "top").unwrap();
    set_mtime(&top, 1_700_000_300);

    let (queue, mut rx) = channel_queue();
    let w = watcher(
        WT,
        Arc::new(LocalFileSystem::new()),
        common::memory_store(),
        queue,
    );
    w.set_options(common::options("drops", &root, r"\.dat$").with_subdirectory_pattern("^2024"))
        .unwrap();

    let outcome = w.poll_once().await.unwrap();
    let paths: Vec<_> = rx.try_recv().unwrap().files.into_iter().map(|f| f.path).collect();
    assert_eq!(
        paths,
        vec![
            root.join("2024-01").join("drop.dat"),
            root.join("2024-02").join("drop.dat"),
        ]
    );
    assert_eq!(outcome.current, Ticks::new(1_700_000_100 * SECOND));
}

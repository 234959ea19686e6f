mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{
    BlockingQueue, FlakyFileSystem, channel_queue, memory_fs, memory_store, next_batch, options,
    watcher,
};
use parsewatch::options::MIN_POLLING_INTERVAL_MS;
use parsewatch::watcher::{WatchError, WatcherStatus};
use parsewatch::{Ticks, WatcherVariant, WatermarkStore};

const CT: WatcherVariant = WatcherVariant::CreationTime;

#[tokio::test]
async fn test_start_without_options_fails() {
    let (queue, _rx) = channel_queue();
    let w = watcher(CT, memory_fs(), memory_store(), queue);

    assert!(matches!(w.start(), Err(WatchError::OptionsNotConfigured)));
    assert_eq!(w.status(), WatcherStatus::Idle);
}

#[tokio::test]
async fn test_stop_before_start_fails() {
    let (queue, _rx) = channel_queue();
    let w = watcher(CT, memory_fs(), memory_store(), queue);
    w.set_options(options("invoices", "/data", "hello")).unwrap();

    assert!(matches!(w.stop(), Err(WatchError::NotRunning)));
}

#[tokio::test]
async fn test_start_twice_fails() {
    let (queue, _rx) = channel_queue();
    let w = watcher(CT, memory_fs(), memory_store(), queue);
    w.set_options(options("invoices", "/data", "hello")).unwrap();

    w.start().unwrap();
    match w.start() {
        Err(WatchError::AlreadyRunning { parser_name }) => assert_eq!(parser_name, "invoices"),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    assert!(w.is_running());

    w.stop().unwrap();
    w.join().await;
}

#[tokio::test]
async fn test_options_locked_while_running() {
    let (queue, _rx) = channel_queue();
    let w = watcher(CT, memory_fs(), memory_store(), queue);
    w.set_options(options("invoices", "/data", "hello")).unwrap();
    w.start().unwrap();

    let result = w.set_options(options("invoices", "/data", "world"));
    assert!(matches!(result, Err(WatchError::AlreadyRunning { .. })));
    assert_eq!(w.options().unwrap().file_search_pattern, "hello");

    w.stop().unwrap();
    assert_eq!(w.status(), WatcherStatus::Stopped);
    w.join().await;

    // Stopped behaves like idle
    w.set_options(options("invoices", "/data", "world")).unwrap();
    assert_eq!(w.options().unwrap().file_search_pattern, "world");
    w.start().unwrap();
    assert!(w.is_running());
    w.stop().unwrap();
    w.join().await;
}

#[tokio::test]
async fn test_invalid_options_are_rejected() {
    let (queue, _rx) = channel_queue();
    let w = watcher(CT, memory_fs(), memory_store(), queue);

    let result = w.set_options(options("invoices", "/data", "hello").with_polling_interval_ms(100));
    assert!(matches!(result, Err(WatchError::InvalidOptions(_))));
    assert!(w.options().is_none());
}

#[tokio::test]
async fn test_poll_once_refused_while_running() {
    let (queue, _rx) = channel_queue();
    let w = watcher(CT, memory_fs(), memory_store(), queue);
    w.set_options(options("invoices", "/data", "hello")).unwrap();
    w.start().unwrap();

    assert!(matches!(
        w.poll_once().await,
        Err(WatchError::AlreadyRunning { .. })
    ));

    w.stop().unwrap();
    w.join().await;
}

#[test]
fn test_start_outside_runtime_fails() {
    let (queue, _rx) = channel_queue();
    let w = watcher(CT, memory_fs(), memory_store(), queue);
    w.set_options(options("invoices", "/data", "hello")).unwrap();

    assert!(matches!(w.start(), Err(WatchError::RuntimeUnavailable)));
    assert_eq!(w.status(), WatcherStatus::Idle);
}

#[tokio::test]
async fn test_loop_polls_immediately_on_start() {
    let fs = memory_fs();
    fs.add_file("/data/hello1.txt", Ticks::new(1_000));
    fs.add_file("/data/world.txt", Ticks::new(1_000));
    let store = memory_store();
    let (queue, mut rx) = channel_queue();

    let w = watcher(CT, fs, store.clone(), queue);
    w.set_options(options("invoices", "/data", "hello")).unwrap();
    w.start().unwrap();

    let batch = next_batch(&mut rx).await;
    assert_eq!(batch.parser_name, "invoices");
    assert_eq!(batch.names(), vec!["hello1.txt"]);

    w.stop().unwrap();
    w.join().await;

    let mark = store.get(CT, "invoices").await.unwrap().unwrap();
    assert_eq!(mark.last_seen, Ticks::new(1_000));
    // Nothing else was handed off
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_stop_interrupts_sleep() {
    let (queue, _rx) = channel_queue();
    let w = watcher(CT, memory_fs(), memory_store(), queue);
    w.set_options(options("invoices", "/data", "hello").with_polling_interval_ms(3_600_000))
        .unwrap();
    w.start().unwrap();

    // Give the first iteration a chance to finish and enter its sleep
    tokio::task::yield_now().await;
    w.stop().unwrap();

    tokio::time::timeout(Duration::from_secs(5), w.join())
        .await
        .expect("poll loop did not exit after stop");
}

#[tokio::test(start_paused = true)]
async fn test_loop_recovers_after_a_failed_iteration() {
    let fs = memory_fs();
    fs.add_file("/data/hello1.txt", Ticks::new(1_000));
    let flaky = Arc::new(FlakyFileSystem::new(fs, 1));
    let (queue, mut rx) = channel_queue();

    let w = watcher(CT, flaky.clone(), memory_store(), queue);
    w.set_options(options("invoices", "/data", "hello")).unwrap();
    w.start().unwrap();

    // First iteration fails on the unreadable root
    while flaky.calls() == 0 {
        tokio::task::yield_now().await;
    }
    assert!(rx.try_recv().is_err());

    tokio::time::advance(Duration::from_millis(MIN_POLLING_INTERVAL_MS)).await;

    let batch = tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("no hand-off after the failed iteration")
        .expect("queue channel closed");
    assert_eq!(batch.names(), vec!["hello1.txt"]);
    assert!(flaky.calls() >= 2);

    w.stop().unwrap();
    w.join().await;
}

#[tokio::test]
async fn test_join_waits_for_loops_stopped_before_a_restart() {
    let fs = memory_fs();
    fs.add_file("/data/hello1.txt", Ticks::new(1_000));
    let queue = Arc::new(BlockingQueue::default());

    let w = Arc::new(watcher(CT, fs, memory_store(), queue.clone()));
    w.set_options(options("invoices", "/data", "hello")).unwrap();

    w.start().unwrap();
    queue.entered.notified().await;

    // First loop is stuck in its hand-off while a second one starts
    w.stop().unwrap();
    w.start().unwrap();
    w.stop().unwrap();

    let joining = {
        let w = w.clone();
        tokio::spawn(async move { w.join().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!joining.is_finished());
    assert!(!queue.finished.load(Ordering::SeqCst));

    queue.release.notify_one();
    tokio::time::timeout(Duration::from_secs(5), joining)
        .await
        .expect("join did not return after the hand-off finished")
        .unwrap();
    assert!(queue.finished.load(Ordering::SeqCst));
}

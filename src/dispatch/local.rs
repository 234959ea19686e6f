//! In-process dispatch queue with per-step retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::{ChainStep, DispatchError, DispatchQueue, FileParser, ProcessingChain};
use crate::config::QueueConfig;
use crate::types::FileDescriptor;

/// Runs each file's chain on a spawned task.
///
/// `enqueue` only spawns; it never waits for a chain to finish. Each step is
/// retried up to `max_attempts` times, and the first step that keeps failing
/// ends that file's chain.
#[derive(Debug)]
pub struct LocalFileQueue {
    config: QueueConfig,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl LocalFileQueue {
    pub fn new(config: QueueConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_files.max(1)));
        Self {
            config,
            permits,
            tracker: TaskTracker::new(),
        }
    }

    /// Number of chains still running or waiting for a permit.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting work and wait for every running chain to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[async_trait]
impl DispatchQueue for LocalFileQueue {
    async fn enqueue(
        &self,
        chain: ProcessingChain,
        files: Vec<FileDescriptor>,
    ) -> Result<(), DispatchError> {
        if self.tracker.is_closed() {
            return Err(DispatchError::Closed);
        }

        let today = chrono::Local::now().date_naive();
        let count = files.len();

        for file in files {
            let steps = chain.plan(&file, Uuid::new_v4(), today);
            let parser = chain.parser.clone();
            let permits = self.permits.clone();
            let config = self.config.clone();
            let parser_name = chain.parser_name.clone();

            self.tracker.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                run_chain(&parser_name, &file, &steps, parser.as_ref(), &config).await;
            });
        }

        crate::log_event!(&chain.parser_name, "enqueued", "{count} files for parsing");
        Ok(())
    }
}

async fn run_chain(
    parser_name: &str,
    file: &FileDescriptor,
    steps: &[ChainStep],
    parser: &dyn FileParser,
    config: &QueueConfig,
) {
    for step in steps {
        if let Err(e) = run_step(parser_name, step, parser, config).await {
            tracing::error!(
                "[{parser_name}] giving up on {} after {} attempts: {e}",
                file.path.display(),
                config.max_attempts
            );
            return;
        }
    }

    crate::debug_event!(parser_name, "processed", "{}", file.path.display());
}

async fn run_step(
    parser_name: &str,
    step: &ChainStep,
    parser: &dyn FileParser,
    config: &QueueConfig,
) -> Result<(), DispatchError> {
    let max_attempts = config.max_attempts.max(1);
    let settle = Duration::from_millis(config.settle_delay_ms);
    let mut attempt = 1;

    loop {
        match step.execute(parser, settle).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < max_attempts => {
                tracing::warn!(
                    "[{parser_name}] {} attempt {attempt}/{max_attempts} failed: {e}",
                    step.name()
                );
                tokio::time::sleep(Duration::from_millis(config.retry_delay_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

//! Watcher lifecycle and the poll loop it drives.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::checker::FileChecker;
use super::error::WatchError;
use crate::dispatch::{DispatchQueue, FileParser, ProcessingChain};
use crate::options::{CompiledOptions, WatcherOptions};
use crate::storage::{Watermark, WatermarkStore};
use crate::types::{FileDescriptor, Ticks, WatcherVariant};

/// Lifecycle state reported by [`Watcher::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherStatus {
    /// Never started.
    Idle,
    /// Poll loop active.
    Running,
    /// Stopped after running. Behaves like `Idle`.
    Stopped,
}

/// Result of a single poll iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Watermark the scan compared against.
    pub previous: Ticks,
    /// Watermark after the iteration.
    pub current: Ticks,
    /// Files handed to the dispatch queue.
    pub files: Vec<FileDescriptor>,
}

enum RunState {
    Idle,
    Running { cancel: CancellationToken },
    Stopped,
}

struct Inner {
    options: Option<Arc<CompiledOptions>>,
    run: RunState,
    /// Loops that were told to stop and may still be mid-iteration.
    finishing: Vec<JoinHandle<()>>,
    /// The loop currently running, if any.
    current: Option<JoinHandle<()>>,
}

/// Polls one parser's directories and hands new files to a dispatch queue.
///
/// `set_options` is only allowed while not running. `start` spawns the poll
/// loop on the current tokio runtime and `stop` signals it to finish. The
/// loop notices cancellation between iterations and while sleeping, so an
/// in-flight scan or hand-off always completes.
pub struct Watcher {
    checker: Arc<dyn FileChecker>,
    store: Arc<dyn WatermarkStore>,
    queue: Arc<dyn DispatchQueue>,
    parser: Arc<dyn FileParser>,
    /// Held for the duration of every iteration, including ones from a loop
    /// that is still winding down after `stop`.
    iteration: Arc<tokio::sync::Mutex<()>>,
    inner: Mutex<Inner>,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("variant", &self.checker.variant())
            .field("parser_name", &self.parser_name())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Watcher {
    pub fn new(
        checker: Arc<dyn FileChecker>,
        store: Arc<dyn WatermarkStore>,
        queue: Arc<dyn DispatchQueue>,
        parser: Arc<dyn FileParser>,
    ) -> Self {
        Self {
            checker,
            store,
            queue,
            parser,
            iteration: Arc::new(tokio::sync::Mutex::new(())),
            inner: Mutex::new(Inner {
                options: None,
                run: RunState::Idle,
                finishing: Vec::new(),
                current: None,
            }),
        }
    }

    pub fn variant(&self) -> WatcherVariant {
        self.checker.variant()
    }

    pub fn status(&self) -> WatcherStatus {
        match self.inner.lock().run {
            RunState::Idle => WatcherStatus::Idle,
            RunState::Running { .. } => WatcherStatus::Running,
            RunState::Stopped => WatcherStatus::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status() == WatcherStatus::Running
    }

    pub fn options(&self) -> Option<WatcherOptions> {
        self.inner
            .lock()
            .options
            .as_ref()
            .map(|o| o.options().clone())
    }

    pub fn parser_name(&self) -> Option<String> {
        self.inner
            .lock()
            .options
            .as_ref()
            .map(|o| o.parser_name().to_string())
    }

    /// Replace the options. Fails while the poll loop is running.
    pub fn set_options(&self, options: WatcherOptions) -> Result<(), WatchError> {
        let mut inner = self.inner.lock();
        if matches!(inner.run, RunState::Running { .. }) {
            return Err(WatchError::AlreadyRunning {
                parser_name: running_name(&inner),
            });
        }

        options.validate()?;
        inner.options = Some(Arc::new(CompiledOptions::compile(options)?));
        Ok(())
    }

    /// Spawn the poll loop. The first poll happens immediately.
    pub fn start(&self) -> Result<(), WatchError> {
        let mut inner = self.inner.lock();
        if matches!(inner.run, RunState::Running { .. }) {
            return Err(WatchError::AlreadyRunning {
                parser_name: running_name(&inner),
            });
        }

        let options = inner
            .options
            .clone()
            .ok_or(WatchError::OptionsNotConfigured)?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| WatchError::RuntimeUnavailable)?;

        let cancel = CancellationToken::new();
        let task = runtime.spawn(self.poller(options).run(cancel.clone()));

        // A previous loop may still be finishing. The iteration lock keeps
        // the two from overlapping and `join` still waits for it.
        inner.finishing.retain(|task| !task.is_finished());
        inner.current = Some(task);
        inner.run = RunState::Running { cancel };
        Ok(())
    }

    /// Signal the poll loop to finish. Does not wait for it; see [`join`].
    ///
    /// [`join`]: Watcher::join
    pub fn stop(&self) -> Result<(), WatchError> {
        let mut inner = self.inner.lock();
        let RunState::Running { cancel } = &inner.run else {
            return Err(WatchError::NotRunning);
        };

        cancel.cancel();
        inner.run = RunState::Stopped;
        if let Some(task) = inner.current.take() {
            inner.finishing.push(task);
        }
        Ok(())
    }

    /// Wait for every stopped poll loop to exit, including loops stopped
    /// before a restart. A running loop is not waited for.
    pub async fn join(&self) {
        let tasks = std::mem::take(&mut self.inner.lock().finishing);

        for task in tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!("[watcher] poll loop panicked: {e}");
                }
            }
        }
    }

    /// Run exactly one iteration now. Fails while the poll loop is running.
    pub async fn poll_once(&self) -> Result<PollOutcome, WatchError> {
        let poller = {
            let inner = self.inner.lock();
            if matches!(inner.run, RunState::Running { .. }) {
                return Err(WatchError::AlreadyRunning {
                    parser_name: running_name(&inner),
                });
            }
            let options = inner
                .options
                .clone()
                .ok_or(WatchError::OptionsNotConfigured)?;
            self.poller(options)
        };

        poller.poll().await
    }

    fn poller(&self, options: Arc<CompiledOptions>) -> Poller {
        Poller {
            checker: self.checker.clone(),
            store: self.store.clone(),
            queue: self.queue.clone(),
            parser: self.parser.clone(),
            iteration: self.iteration.clone(),
            options,
        }
    }
}

fn running_name(inner: &Inner) -> String {
    inner
        .options
        .as_ref()
        .map(|o| o.parser_name().to_string())
        .unwrap_or_default()
}

/// Everything one poll iteration needs, detached from the watcher's lock.
struct Poller {
    checker: Arc<dyn FileChecker>,
    store: Arc<dyn WatermarkStore>,
    queue: Arc<dyn DispatchQueue>,
    parser: Arc<dyn FileParser>,
    iteration: Arc<tokio::sync::Mutex<()>>,
    options: Arc<CompiledOptions>,
}

impl Poller {
    fn name(&self) -> &str {
        self.options.parser_name()
    }

    async fn run(self, cancel: CancellationToken) {
        let interval = Duration::from_millis(self.options.options().polling_interval_ms);
        crate::log_event!(
            self.name(),
            "started",
            "{} watcher polling every {}ms",
            self.checker.variant(),
            interval.as_millis()
        );

        while !cancel.is_cancelled() {
            match self.poll().await {
                Ok(outcome) if !outcome.files.is_empty() => {
                    crate::log_event!(
                        self.name(),
                        "handed off",
                        "{} files, watermark {}",
                        outcome.files.len(),
                        outcome.current
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("[{}] failed to check for new files: {e}", self.name());
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        crate::log_event!(self.name(), "stopped");
    }

    async fn poll(&self) -> Result<PollOutcome, WatchError> {
        let _iteration = self.iteration.lock().await;
        let name = self.name();
        let variant = self.checker.variant();

        crate::debug_event!(name, "checking", "{}", self.options.options().directory_to_watch.display());

        let watermark = self.watermark().await?;
        let previous = watermark.last_seen;

        let checker = self.checker.clone();
        let options = self.options.clone();
        let files = tokio::task::spawn_blocking(move || {
            checker.find_candidate_files(&options, previous)
        })
        .await
        .map_err(|e| WatchError::TaskFailed {
            reason: e.to_string(),
        })??;

        let Some(newest) = files.iter().map(|f| f.timestamp).max() else {
            crate::log_event!(name, "found no new files");
            return Ok(PollOutcome {
                previous,
                current: previous,
                files,
            });
        };

        // Advanced on detection, before the hand-off
        let advanced = self.store.advance(variant, name, newest).await?;

        let chain = ProcessingChain::from_options(self.options.options(), self.parser.clone());
        self.queue.enqueue(chain, files.clone()).await?;

        Ok(PollOutcome {
            previous,
            current: advanced.last_seen,
            files,
        })
    }

    async fn watermark(&self) -> Result<Watermark, WatchError> {
        let variant = self.checker.variant();
        let name = self.name();

        match self.store.get(variant, name).await? {
            Some(watermark) => Ok(watermark),
            None => {
                crate::debug_event!(name, "no watermark stored, creating one");
                Ok(self.store.create(variant, name).await?)
            }
        }
    }
}

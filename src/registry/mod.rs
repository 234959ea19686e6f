//! Registry of independently configured watchers.
//!
//! The registry validates options, keeps watched (directory, file pattern,
//! subdirectory pattern) triples and parser names unique, and owns each
//! watcher under an opaque [`ParserHandle`].

mod error;

pub use error::RegistryError;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::dispatch::{DispatchQueue, FileParser};
use crate::options::WatcherOptions;
use crate::scanner::{DirectoryScanner, FileSystem, LocalFileSystem};
use crate::storage::{MemoryWatermarkStore, WatermarkStore};
use crate::types::{ParserHandle, WatcherVariant};
use crate::watcher::{PollOutcome, WatchError, Watcher, WatcherStatus, checker_for};

/// A watcher bound to its options.
///
/// Options can only be changed through [`ParserRegistry::set_options`], so
/// the uniqueness rules hold for the lifetime of the registration.
#[derive(Debug)]
pub struct ParserRegistration {
    handle: ParserHandle,
    options: RwLock<WatcherOptions>,
    watcher: Watcher,
}

impl ParserRegistration {
    pub fn handle(&self) -> ParserHandle {
        self.handle
    }

    pub fn variant(&self) -> WatcherVariant {
        self.watcher.variant()
    }

    pub fn options(&self) -> WatcherOptions {
        self.options.read().clone()
    }

    pub fn parser_name(&self) -> String {
        self.options.read().parser_name.clone()
    }

    pub fn status(&self) -> WatcherStatus {
        self.watcher.status()
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_running()
    }

    /// Run one iteration now; see [`Watcher::poll_once`].
    pub async fn poll_once(&self) -> Result<PollOutcome, WatchError> {
        self.watcher.poll_once().await
    }

    /// Whether this registration already owns `options`' name or watch triple.
    fn conflicts_with(&self, options: &WatcherOptions) -> bool {
        let own = self.options.read();
        own.parser_name == options.parser_name || own.identity() == options.identity()
    }
}

/// Owns every registered watcher for the process.
pub struct ParserRegistry {
    scanner: DirectoryScanner,
    store: Arc<dyn WatermarkStore>,
    queue: Arc<dyn DispatchQueue>,
    registrations: RwLock<HashMap<ParserHandle, Arc<ParserRegistration>>>,
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("registrations", &self.len())
            .finish_non_exhaustive()
    }
}

impl ParserRegistry {
    /// Create a builder for configuring the registry.
    pub fn builder() -> ParserRegistryBuilder {
        ParserRegistryBuilder::new()
    }

    /// Validate `options`, check uniqueness, and bind a new watcher.
    pub fn register(
        &self,
        variant: WatcherVariant,
        options: WatcherOptions,
        parser: Arc<dyn FileParser>,
    ) -> Result<ParserHandle, RegistryError> {
        options.validate()?;

        // Held across check and insert so two racing registrations can't
        // both pass the uniqueness check.
        let mut registrations = self.registrations.write();

        ensure_unique(&registrations, None, &options)?;

        let watcher = Watcher::new(
            checker_for(variant, self.scanner.clone()),
            self.store.clone(),
            self.queue.clone(),
            parser,
        );
        watcher.set_options(options.clone())?;

        let handle = ParserHandle::new();
        crate::log_event!(
            "registry",
            "registered",
            "{} ({variant}) as {handle}",
            options.parser_name
        );

        registrations.insert(
            handle,
            Arc::new(ParserRegistration {
                handle,
                options: RwLock::new(options),
                watcher,
            }),
        );

        Ok(handle)
    }

    /// Replace the options of a registered, non-running watcher. The new
    /// options are validated and checked for uniqueness against every other
    /// registration.
    pub fn set_options(
        &self,
        handle: ParserHandle,
        options: WatcherOptions,
    ) -> Result<(), RegistryError> {
        options.validate()?;

        let registrations = self.registrations.write();
        let registration = registrations
            .get(&handle)
            .ok_or(RegistryError::ParserNotRegistered(handle))?;

        ensure_unique(&registrations, Some(handle), &options)?;
        registration.watcher.set_options(options.clone())?;

        crate::log_event!(
            "registry",
            "reconfigured",
            "{handle} as {}",
            options.parser_name
        );
        *registration.options.write() = options;
        Ok(())
    }

    pub fn get(&self, handle: ParserHandle) -> Option<Arc<ParserRegistration>> {
        self.registrations.read().get(&handle).cloned()
    }

    pub fn find_by_name(&self, parser_name: &str) -> Option<Arc<ParserRegistration>> {
        self.registrations
            .read()
            .values()
            .find(|r| r.options.read().parser_name == parser_name)
            .cloned()
    }

    pub fn handles(&self) -> Vec<ParserHandle> {
        self.registrations.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    pub fn start(&self, handle: ParserHandle) -> Result<(), RegistryError> {
        self.lookup(handle)?.watcher.start()?;
        Ok(())
    }

    pub fn stop(&self, handle: ParserHandle) -> Result<(), RegistryError> {
        self.lookup(handle)?.watcher.stop()?;
        Ok(())
    }

    /// Start every registered watcher. Watchers that fail to start don't
    /// affect the others; all failures are reported together.
    pub fn start_all(&self) -> Result<usize, RegistryError> {
        self.for_each(|watcher| watcher.start())
    }

    /// Stop every registered watcher. Same reporting as [`start_all`].
    ///
    /// [`start_all`]: ParserRegistry::start_all
    pub fn stop_all(&self) -> Result<usize, RegistryError> {
        self.for_each(|watcher| watcher.stop())
    }

    /// Remove a registration, stopping its watcher first if it is running.
    pub async fn unregister(&self, handle: ParserHandle) -> Result<(), RegistryError> {
        let registration = self
            .registrations
            .write()
            .remove(&handle)
            .ok_or(RegistryError::ParserNotRegistered(handle))?;

        if registration.watcher.is_running() {
            registration.watcher.stop()?;
        }
        registration.watcher.join().await;

        crate::log_event!("registry", "unregistered", "{}", registration.parser_name());
        Ok(())
    }

    /// Stop every running watcher and wait for all poll loops to exit.
    pub async fn shutdown(&self) {
        let registrations = self.snapshot();

        for registration in &registrations {
            if registration.watcher.is_running() {
                if let Err(e) = registration.watcher.stop() {
                    tracing::warn!(
                        "[registry] failed to stop {}: {e}",
                        registration.parser_name()
                    );
                }
            }
        }

        for registration in &registrations {
            registration.watcher.join().await;
        }

        crate::log_event!("registry", "shut down", "{} parsers", registrations.len());
    }

    fn lookup(&self, handle: ParserHandle) -> Result<Arc<ParserRegistration>, RegistryError> {
        self.get(handle)
            .ok_or(RegistryError::ParserNotRegistered(handle))
    }

    fn snapshot(&self) -> Vec<Arc<ParserRegistration>> {
        self.registrations.read().values().cloned().collect()
    }

    fn for_each<F>(&self, op: F) -> Result<usize, RegistryError>
    where
        F: Fn(&Watcher) -> Result<(), WatchError>,
    {
        let registrations = self.snapshot();
        let mut failures = Vec::new();

        for registration in &registrations {
            if let Err(e) = op(&registration.watcher) {
                tracing::warn!("[registry] {}: {e}", registration.parser_name());
                failures.push((registration.handle, e));
            }
        }

        if failures.is_empty() {
            Ok(registrations.len())
        } else {
            Err(RegistryError::Bulk { failures })
        }
    }
}

fn ensure_unique(
    registrations: &HashMap<ParserHandle, Arc<ParserRegistration>>,
    skip: Option<ParserHandle>,
    options: &WatcherOptions,
) -> Result<(), RegistryError> {
    match registrations
        .values()
        .find(|r| Some(r.handle) != skip && r.conflicts_with(options))
    {
        Some(existing) => Err(RegistryError::ParserNotUnique {
            parser_name: options.parser_name.clone(),
            existing: existing.parser_name(),
        }),
        None => Ok(()),
    }
}

/// Builder for constructing a ParserRegistry.
pub struct ParserRegistryBuilder {
    file_system: Option<Arc<dyn FileSystem>>,
    store: Option<Arc<dyn WatermarkStore>>,
    queue: Option<Arc<dyn DispatchQueue>>,
}

impl ParserRegistryBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            file_system: None,
            store: None,
            queue: None,
        }
    }

    /// Set the filesystem scanned by every watcher. Defaults to local disk.
    pub fn file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = Some(file_system);
        self
    }

    /// Set the watermark store. Defaults to an in-memory store.
    pub fn store(mut self, store: Arc<dyn WatermarkStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the dispatch queue.
    pub fn queue(mut self, queue: Arc<dyn DispatchQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Build the ParserRegistry.
    pub fn build(self) -> Result<ParserRegistry, RegistryError> {
        let queue = self
            .queue
            .ok_or(RegistryError::MissingComponent("dispatch queue"))?;

        let file_system = self
            .file_system
            .unwrap_or_else(|| Arc::new(LocalFileSystem::new()));

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryWatermarkStore::new()));

        Ok(ParserRegistry {
            scanner: DirectoryScanner::new(file_system),
            store,
            queue,
            registrations: RwLock::new(HashMap::new()),
        })
    }
}

impl Default for ParserRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! The watermark contract shared by every store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::StorageResult;
use crate::types::{Ticks, WatcherVariant};

/// Last seen file timestamp for one parser and watcher variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub parser_name: String,
    pub variant: WatcherVariant,
    pub last_seen: Ticks,
}

/// Persists one watermark per (variant, parser name).
///
/// Implementations must make each operation atomic per key: concurrent
/// `advance` calls for the same parser may never lose the larger value.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Read the stored watermark, if one was ever created.
    async fn get(&self, variant: WatcherVariant, parser_name: &str)
    -> StorageResult<Option<Watermark>>;

    /// Seed the watermark at [`Ticks::MIN`]. Returns the existing row
    /// untouched when it is already present.
    async fn create(&self, variant: WatcherVariant, parser_name: &str) -> StorageResult<Watermark>;

    /// Move the watermark to `max(current, ticks)`. Never rewinds.
    async fn advance(
        &self,
        variant: WatcherVariant,
        parser_name: &str,
        ticks: Ticks,
    ) -> StorageResult<Watermark>;

    /// Every stored watermark, ordered by variant then parser name.
    async fn list(&self) -> StorageResult<Vec<Watermark>>;
}

/// In-memory table backing both store implementations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct WatermarkTable {
    #[serde(default)]
    creation_time: BTreeMap<String, Ticks>,
    #[serde(default)]
    write_time: BTreeMap<String, Ticks>,
}

impl WatermarkTable {
    fn column(&self, variant: WatcherVariant) -> &BTreeMap<String, Ticks> {
        match variant {
            WatcherVariant::CreationTime => &self.creation_time,
            WatcherVariant::WriteTime => &self.write_time,
        }
    }

    fn column_mut(&mut self, variant: WatcherVariant) -> &mut BTreeMap<String, Ticks> {
        match variant {
            WatcherVariant::CreationTime => &mut self.creation_time,
            WatcherVariant::WriteTime => &mut self.write_time,
        }
    }

    pub(crate) fn get(&self, variant: WatcherVariant, parser_name: &str) -> Option<Watermark> {
        self.column(variant)
            .get(parser_name)
            .map(|&last_seen| Watermark {
                parser_name: parser_name.to_string(),
                variant,
                last_seen,
            })
    }

    /// Returns the row and whether the table changed.
    pub(crate) fn create(&mut self, variant: WatcherVariant, parser_name: &str) -> (Watermark, bool) {
        let column = self.column_mut(variant);
        let changed = !column.contains_key(parser_name);
        let last_seen = *column.entry(parser_name.to_string()).or_insert(Ticks::MIN);

        (
            Watermark {
                parser_name: parser_name.to_string(),
                variant,
                last_seen,
            },
            changed,
        )
    }

    /// Returns the row and whether the table changed.
    pub(crate) fn advance(
        &mut self,
        variant: WatcherVariant,
        parser_name: &str,
        ticks: Ticks,
    ) -> (Watermark, bool) {
        let column = self.column_mut(variant);
        let existed = column.contains_key(parser_name);
        let current = column.entry(parser_name.to_string()).or_insert(Ticks::MIN);
        let raised = ticks > *current;
        if raised {
            *current = ticks;
        }

        (
            Watermark {
                parser_name: parser_name.to_string(),
                variant,
                last_seen: *current,
            },
            raised || !existed,
        )
    }

    pub(crate) fn list(&self) -> Vec<Watermark> {
        [WatcherVariant::CreationTime, WatcherVariant::WriteTime]
            .into_iter()
            .flat_map(|variant| {
                self.column(variant)
                    .iter()
                    .map(move |(name, &last_seen)| Watermark {
                        parser_name: name.clone(),
                        variant,
                        last_seen,
                    })
            })
            .collect()
    }
}

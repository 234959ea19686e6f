//! Process-local watermark store.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::watermark::WatermarkTable;
use super::{StorageResult, Watermark, WatermarkStore};
use crate::types::{Ticks, WatcherVariant};

/// Keeps watermarks in memory only; state is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    table: Mutex<WatermarkTable>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn get(
        &self,
        variant: WatcherVariant,
        parser_name: &str,
    ) -> StorageResult<Option<Watermark>> {
        Ok(self.table.lock().get(variant, parser_name))
    }

    async fn create(&self, variant: WatcherVariant, parser_name: &str) -> StorageResult<Watermark> {
        Ok(self.table.lock().create(variant, parser_name).0)
    }

    async fn advance(
        &self,
        variant: WatcherVariant,
        parser_name: &str,
        ticks: Ticks,
    ) -> StorageResult<Watermark> {
        Ok(self.table.lock().advance(variant, parser_name, ticks).0)
    }

    async fn list(&self) -> StorageResult<Vec<Watermark>> {
        Ok(self.table.lock().list())
    }
}

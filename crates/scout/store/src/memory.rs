//! In-memory store implementation

use crate::error::{StoreError, StoreResult};
use crate::table::UnitTable;
use crate::traits::MetadataStore;
use async_trait::async_trait;
use scout_types::{UnitName, UnitPatch, UnitRecord};
use tokio::sync::RwLock;

/// In-memory store for development and testing
#[derive(Debug, Default)]
pub struct InMemoryStore {
    table: RwLock<UnitTable>,
}

impl InMemoryStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `table`
    pub fn with_table(table: UnitTable) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn load(&self) -> StoreResult<UnitTable> {
        Ok(self.table.read().await.clone())
    }

    async fn save(&self, table: &UnitTable) -> StoreResult<()> {
        *self.table.write().await = table.clone();
        Ok(())
    }

    async fn get(&self, name: &UnitName) -> StoreResult<Option<UnitRecord>> {
        let table = self.table.read().await;
        if let Some(malformed) = table.malformed.get(name) {
            return Err(StoreError::Malformed {
                unit: name.clone(),
                reason: malformed.error.clone(),
            });
        }
        Ok(table.records.get(name).cloned())
    }

    async fn upsert(&self, name: &UnitName, patch: UnitPatch) -> StoreResult<UnitRecord> {
        let mut table = self.table.write().await;
        if let Some(malformed) = table.malformed.get(name) {
            return Err(StoreError::Malformed {
                unit: name.clone(),
                reason: malformed.error.clone(),
            });
        }

        let record = match table.records.get(name).cloned() {
            Some(mut record) => {
                patch.apply(&mut record);
                record
            }
            None => patch
                .into_record()
                .ok_or_else(|| StoreError::IncompleteRecord(name.clone()))?,
        };
        table.records.insert(name.clone(), record.clone());
        Ok(record)
    }
}

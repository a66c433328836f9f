//! Store trait definition

use crate::error::StoreResult;
use crate::table::UnitTable;
use async_trait::async_trait;
use scout_types::{UnitName, UnitPatch, UnitRecord};

/// Durable mapping of unit name to [`UnitRecord`]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Load the full mapping. An absent or empty backing file is an empty table.
    async fn load(&self) -> StoreResult<UnitTable>;

    /// Replace the full mapping. Readers never observe a partial write.
    async fn save(&self, table: &UnitTable) -> StoreResult<()>;

    /// Get one record
    async fn get(&self, name: &UnitName) -> StoreResult<Option<UnitRecord>>;

    /// Merge `patch` into the record for `name`, creating it if absent.
    /// Returns the stored record.
    async fn upsert(&self, name: &UnitName, patch: UnitPatch) -> StoreResult<UnitRecord>;
}

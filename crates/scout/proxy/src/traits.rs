//! Proxy configurer trait definition

use crate::error::Result;
use async_trait::async_trait;
use scout_types::{UnitName, UnitRecord};
use std::collections::BTreeMap;

/// Keeps the reverse proxy in sync with the provisioned units
#[async_trait]
pub trait ProxyConfigurer: Send + Sync {
    /// Rewrite the proxy configuration from every known record
    async fn regenerate(&self, records: &BTreeMap<UnitName, UnitRecord>) -> Result<()>;

    /// Make the proxy pick up the current configuration
    async fn reload(&self) -> Result<()>;
}

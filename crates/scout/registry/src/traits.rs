//! Registry trait definition

use crate::error::Result;
use async_trait::async_trait;
use scout_types::{Protocol, UnitName};

/// Read-only view of chain membership
#[async_trait]
pub trait Registry: Send + Sync {
    /// Names of every chain the agent is responsible for
    async fn list_chain_names(&self) -> Result<Vec<UnitName>>;

    /// Whether the chain's key-generation ceremony has completed
    async fn is_readiness_gate_passed(&self, name: &UnitName) -> Result<bool>;

    /// First reachable endpoint for `protocol`, if any
    async fn resolve_endpoint(&self, name: &UnitName, protocol: Protocol)
        -> Result<Option<String>>;
}

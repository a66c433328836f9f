//! Verification client trait definition

use crate::error::Result;
use async_trait::async_trait;
use scout_types::{ContractMeta, PollStatus, UnitName, VerificationToken};
use std::collections::HashSet;

/// Explorer instance a verification call is addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerHandle {
    pub name: UnitName,
    pub base_url: String,
}

impl ExplorerHandle {
    pub fn new(name: UnitName, base_url: impl Into<String>) -> Self {
        Self {
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Contract verification API of an explorer
#[async_trait]
pub trait VerificationClient: Send + Sync {
    /// Addresses the explorer reports as verified, normalized
    async fn list_verified_addresses(&self, target: &ExplorerHandle) -> Result<HashSet<String>>;

    /// Queue verification of one contract
    async fn submit(
        &self,
        target: &ExplorerHandle,
        address: &str,
        meta: &ContractMeta,
    ) -> Result<VerificationToken>;

    /// Status of a queued verification
    async fn poll_status(
        &self,
        target: &ExplorerHandle,
        token: &VerificationToken,
    ) -> Result<PollStatus>;
}

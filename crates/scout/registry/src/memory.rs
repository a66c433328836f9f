//! In-memory registry for development and testing

use crate::error::{RegistryError, Result};
use crate::traits::Registry;
use async_trait::async_trait;
use dashmap::DashMap;
use scout_types::{Protocol, UnitName};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct ChainEntry {
    gate_passed: bool,
    http: Option<String>,
    ws: Option<String>,
    unreachable: bool,
}

/// Registry whose chains are set programmatically
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    order: RwLock<Vec<UnitName>>,
    chains: DashMap<UnitName, ChainEntry>,
    listing_fails: AtomicBool,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chain (or replace it) with endpoints for both protocols
    pub fn add_chain(&self, name: &str, gate_passed: bool, http: &str, ws: &str) {
        let unit = UnitName::new(name);
        self.chains.insert(
            unit.clone(),
            ChainEntry {
                gate_passed,
                http: Some(http.to_string()),
                ws: Some(ws.to_string()),
                unreachable: false,
            },
        );
        if let Ok(mut order) = self.order.write() {
            if !order.contains(&unit) {
                order.push(unit);
            }
        }
    }

    pub fn remove_chain(&self, name: &str) {
        let unit = UnitName::new(name);
        self.chains.remove(&unit);
        if let Ok(mut order) = self.order.write() {
            order.retain(|n| n != &unit);
        }
    }

    pub fn set_gate(&self, name: &str, passed: bool) {
        if let Some(mut entry) = self.chains.get_mut(&UnitName::new(name)) {
            entry.gate_passed = passed;
        }
    }

    /// Replace the endpoint returned for `protocol`
    pub fn set_endpoint(&self, name: &str, protocol: Protocol, endpoint: Option<&str>) {
        if let Some(mut entry) = self.chains.get_mut(&UnitName::new(name)) {
            let endpoint = endpoint.map(str::to_string);
            match protocol {
                Protocol::Http => entry.http = endpoint,
                Protocol::Ws => entry.ws = endpoint,
            }
        }
    }

    /// Make endpoint resolution for `name` fail with a transport error
    pub fn set_unreachable(&self, name: &str, unreachable: bool) {
        if let Some(mut entry) = self.chains.get_mut(&UnitName::new(name)) {
            entry.unreachable = unreachable;
        }
    }

    /// Make `list_chain_names` fail
    pub fn set_listing_fails(&self, fails: bool) {
        self.listing_fails.store(fails, Ordering::SeqCst);
    }

    fn entry(&self, name: &UnitName) -> Result<ChainEntry> {
        self.chains
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| RegistryError::ChainNotFound(name.to_string()))
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn list_chain_names(&self) -> Result<Vec<UnitName>> {
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(RegistryError::Transport("registry unavailable".into()));
        }
        self.order
            .read()
            .map(|order| order.clone())
            .map_err(|e| RegistryError::Transport(e.to_string()))
    }

    async fn is_readiness_gate_passed(&self, name: &UnitName) -> Result<bool> {
        Ok(self.entry(name)?.gate_passed)
    }

    async fn resolve_endpoint(
        &self,
        name: &UnitName,
        protocol: Protocol,
    ) -> Result<Option<String>> {
        let entry = self.entry(name)?;
        if entry.unreachable {
            return Err(RegistryError::Transport(format!("{} unreachable", name)));
        }
        Ok(match protocol {
            Protocol::Http => entry.http,
            Protocol::Ws => entry.ws,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listing_preserves_insertion_order() {
        let registry = MemoryRegistry::new();
        registry.add_chain("beta", true, "http://b", "ws://b");
        registry.add_chain("alpha", true, "http://a", "ws://a");
        registry.add_chain("beta", false, "http://b2", "ws://b2");

        let names = registry.list_chain_names().await.unwrap();
        assert_eq!(names, vec![UnitName::new("beta"), UnitName::new("alpha")]);
        assert!(!registry
            .is_readiness_gate_passed(&UnitName::new("beta"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_resolution_and_failures() {
        let registry = MemoryRegistry::new();
        registry.add_chain("alpha", true, "http://a", "ws://a");
        let alpha = UnitName::new("alpha");

        assert_eq!(
            registry.resolve_endpoint(&alpha, Protocol::Ws).await.unwrap(),
            Some("ws://a".into())
        );

        registry.set_endpoint("alpha", Protocol::Ws, None);
        assert_eq!(registry.resolve_endpoint(&alpha, Protocol::Ws).await.unwrap(), None);

        registry.set_unreachable("alpha", true);
        assert!(registry.resolve_endpoint(&alpha, Protocol::Http).await.is_err());

        registry.set_listing_fails(true);
        assert!(registry.list_chain_names().await.is_err());

        assert!(registry
            .is_readiness_gate_passed(&UnitName::new("missing"))
            .await
            .is_err());
    }
}

//! Required contracts per unit

use crate::error::{Result, VerifyError};
use async_trait::async_trait;
use dashmap::DashMap;
use scout_types::{ContractMeta, UnitName};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Contracts that must be verified, keyed by address
pub type RequiredContracts = BTreeMap<String, ContractMeta>;

/// Source of each unit's required contracts
#[async_trait]
pub trait ContractCatalog: Send + Sync {
    async fn required_contracts(&self, name: &UnitName) -> Result<RequiredContracts>;
}

#[derive(Deserialize)]
struct ChainConfig {
    verify: RequiredContracts,
}

/// Reads `<dir>/<name>.json` and takes its `verify` section
#[derive(Debug, Clone)]
pub struct ConfigDirCatalog {
    dir: PathBuf,
}

impl ConfigDirCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ContractCatalog for ConfigDirCatalog {
    async fn required_contracts(&self, name: &UnitName) -> Result<RequiredContracts> {
        let path = self.dir.join(format!("{}.json", name));
        let catalog_error = |reason: String| VerifyError::Catalog {
            unit: name.to_string(),
            reason,
        };

        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| catalog_error(format!("{}: {}", path.display(), e)))?;
        let config: ChainConfig =
            serde_json::from_str(&contents).map_err(|e| catalog_error(e.to_string()))?;
        Ok(config.verify)
    }
}

/// Catalog populated in code
#[derive(Debug, Default)]
pub struct StaticCatalog {
    contracts: DashMap<UnitName, RequiredContracts>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: UnitName, contracts: RequiredContracts) {
        self.contracts.insert(name, contracts);
    }
}

#[async_trait]
impl ContractCatalog for StaticCatalog {
    async fn required_contracts(&self, name: &UnitName) -> Result<RequiredContracts> {
        self.contracts
            .get(name)
            .map(|c| c.value().clone())
            .ok_or_else(|| VerifyError::Catalog {
                unit: name.to_string(),
                reason: "no contracts registered".into(),
            })
    }
}

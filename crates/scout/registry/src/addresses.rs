//! Contract addresses loaded from the manager ABI file

use crate::error::{RegistryError, Result};
use alloy::primitives::Address;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// Addresses of the manager contracts the registry reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryAddresses {
    pub schains_internal: Address,
    pub nodes: Address,
    pub skale_dkg: Address,
}

/// The subset of the ABI file the registry needs
#[derive(Deserialize)]
struct AbiFile {
    schains_internal_address: String,
    nodes_address: String,
    skale_d_k_g_address: String,
}

impl RegistryAddresses {
    /// Load addresses from the ABI file. A missing file is a startup
    /// precondition failure.
    pub fn from_abi_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(RegistryError::AbiNotFound(path.to_path_buf()));
        }
        let contents =
            std::fs::read_to_string(path).map_err(|e| RegistryError::InvalidAbi(e.to_string()))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let abi: AbiFile =
            serde_json::from_str(contents).map_err(|e| RegistryError::InvalidAbi(e.to_string()))?;

        Ok(Self {
            schains_internal: parse_address("schains_internal_address", &abi.schains_internal_address)?,
            nodes: parse_address("nodes_address", &abi.nodes_address)?,
            skale_dkg: parse_address("skale_d_k_g_address", &abi.skale_d_k_g_address)?,
        })
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address> {
    Address::from_str(value.trim()).map_err(|_| RegistryError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

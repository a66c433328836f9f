//! Registry backed by the SKALE manager contracts

use crate::addresses::RegistryAddresses;
use crate::endpoints::{chain_base_port, proxy_endpoint, IndexRange, NodeEndpoints};
use crate::error::{RegistryError, Result};
use crate::traits::Registry;
use alloy::primitives::{keccak256, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::sol;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use scout_types::{Protocol, UnitName};
use std::net::Ipv4Addr;
use std::time::Duration;

sol! {
    #[sol(rpc)]
    contract SchainsInternal {
        function getSchains() external view returns (bytes32[] memory);
        function getSchainName(bytes32 schainHash) external view returns (string memory);
        function getNodesInGroup(bytes32 schainHash) external view returns (uint256[] memory);
        function getSchainIdsForNode(uint256 nodeIndex) external view returns (bytes32[] memory);
    }

    #[sol(rpc)]
    contract Nodes {
        function getNodeIP(uint256 nodeIndex) external view returns (bytes4);
        function getNodePort(uint256 nodeIndex) external view returns (uint16);
        function getNodeDomainName(uint256 nodeIndex) external view returns (string memory);
    }

    #[sol(rpc)]
    contract SkaleDKG {
        function isLastDKGSuccessful(bytes32 schainHash) external view returns (bool);
    }
}

/// Connection settings for [`SkaleManagerRegistry`]
#[derive(Debug, Clone)]
pub struct SkaleRegistryConfig {
    /// JSON-RPC endpoint of the chain hosting the manager contracts
    pub eth_endpoint: String,

    /// Public proxy domain tried before node endpoints
    pub proxy_domain: Option<String>,

    /// Slice of the registry's chain list handled by this agent
    pub index_range: IndexRange,

    /// Timeout for each endpoint liveness probe
    pub probe_timeout: Duration,
}

/// Registry reading chain membership from the manager contracts
pub struct SkaleManagerRegistry {
    config: SkaleRegistryConfig,
    addresses: RegistryAddresses,
    provider: DynProvider,
}

impl std::fmt::Debug for SkaleManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkaleManagerRegistry")
            .field("config", &self.config)
            .field("addresses", &self.addresses)
            .finish_non_exhaustive()
    }
}

/// Hash identifying a chain in the manager contracts
pub fn chain_hash(name: &UnitName) -> B256 {
    keccak256(name.as_str().as_bytes())
}

impl SkaleManagerRegistry {
    pub fn new(config: SkaleRegistryConfig, addresses: RegistryAddresses) -> Result<Self> {
        let url: Url = config
            .eth_endpoint
            .parse()
            .map_err(|_| RegistryError::InvalidEndpoint(config.eth_endpoint.clone()))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self {
            config,
            addresses,
            provider,
        })
    }

    /// Candidate endpoints served by the nodes hosting `name`
    async fn node_endpoints(&self, name: &UnitName) -> Result<Vec<NodeEndpoints>> {
        let schains = SchainsInternal::new(self.addresses.schains_internal, self.provider.clone());
        let nodes = Nodes::new(self.addresses.nodes, self.provider.clone());
        let hash = chain_hash(name);

        let node_ids = schains
            .getNodesInGroup(hash)
            .call()
            .await
            .map_err(contract_error)?;

        let mut endpoints = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            let hosted = schains
                .getSchainIdsForNode(node_id)
                .call()
                .await
                .map_err(contract_error)?;
            let Some(index) = hosted.iter().position(|h| *h == hash) else {
                tracing::warn!(unit = %name, node = %node_id, "Chain not listed on its own node");
                continue;
            };

            let ip = nodes.getNodeIP(node_id).call().await.map_err(contract_error)?;
            let port = nodes.getNodePort(node_id).call().await.map_err(contract_error)?;
            let domain = nodes
                .getNodeDomainName(node_id)
                .call()
                .await
                .map_err(contract_error)?;

            let Some(base) = chain_base_port(port, index) else {
                tracing::warn!(unit = %name, node = %node_id, "Chain base port out of range");
                continue;
            };

            endpoints.push(NodeEndpoints {
                ip: Ipv4Addr::from(ip.0),
                domain,
                chain_base_port: base,
            });
        }
        Ok(endpoints)
    }

    /// Whether `endpoint` answers `eth_blockNumber` within the probe timeout
    async fn is_alive(&self, endpoint: &str, protocol: Protocol) -> bool {
        let probe = async {
            match protocol {
                Protocol::Http => {
                    let url: Url = endpoint
                        .parse()
                        .map_err(|_| RegistryError::InvalidEndpoint(endpoint.to_string()))?;
                    ProviderBuilder::new()
                        .connect_http(url)
                        .get_block_number()
                        .await
                        .map_err(|e| RegistryError::Transport(e.to_string()))
                }
                Protocol::Ws => {
                    let provider = ProviderBuilder::new()
                        .connect_ws(WsConnect::new(endpoint))
                        .await
                        .map_err(|e| RegistryError::Transport(e.to_string()))?;
                    provider
                        .get_block_number()
                        .await
                        .map_err(|e| RegistryError::Transport(e.to_string()))
                }
            }
        };

        match tokio::time::timeout(self.config.probe_timeout, probe).await {
            Ok(Ok(block)) => {
                tracing::debug!(%endpoint, block, "Endpoint alive");
                true
            }
            Ok(Err(e)) => {
                tracing::debug!(%endpoint, error = %e, "Endpoint probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(%endpoint, "Endpoint probe timed out");
                false
            }
        }
    }
}

fn contract_error(e: alloy::contract::Error) -> RegistryError {
    RegistryError::Contract(e.to_string())
}

#[async_trait]
impl Registry for SkaleManagerRegistry {
    async fn list_chain_names(&self) -> Result<Vec<UnitName>> {
        let schains = SchainsInternal::new(self.addresses.schains_internal, self.provider.clone());
        let hashes = schains.getSchains().call().await.map_err(contract_error)?;
        let hashes = self.config.index_range.apply(hashes);

        let mut names = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let raw = schains
                .getSchainName(hash)
                .call()
                .await
                .map_err(contract_error)?;
            match UnitName::parse(raw) {
                Ok(name) => names.push(name),
                Err(e) => tracing::warn!(%hash, error = %e, "Skipping chain with unusable name"),
            }
        }
        Ok(names)
    }

    async fn is_readiness_gate_passed(&self, name: &UnitName) -> Result<bool> {
        let dkg = SkaleDKG::new(self.addresses.skale_dkg, self.provider.clone());
        dkg.isLastDKGSuccessful(chain_hash(name))
            .call()
            .await
            .map_err(contract_error)
    }

    async fn resolve_endpoint(
        &self,
        name: &UnitName,
        protocol: Protocol,
    ) -> Result<Option<String>> {
        if let Some(domain) = &self.config.proxy_domain {
            let endpoint = proxy_endpoint(domain, name, protocol);
            if self.is_alive(&endpoint, protocol).await {
                return Ok(Some(endpoint));
            }
        }

        for node in self.node_endpoints(name).await? {
            let endpoint = node.endpoint(protocol);
            if self.is_alive(&endpoint, protocol).await {
                return Ok(Some(endpoint));
            }
        }

        tracing::warn!(unit = %name, %protocol, "No reachable endpoint");
        Ok(None)
    }
}

//! Endpoint composition for chains hosted on registry nodes
//!
//! Every node reserves a block of [`PORTS_PER_CHAIN`] ports per hosted chain,
//! starting at the node's base port in the order the node lists its chains.

use scout_types::{Protocol, UnitName};
use serde::Deserialize;
use std::net::Ipv4Addr;

/// Ports reserved on a node for each hosted chain
pub const PORTS_PER_CHAIN: u16 = 64;

/// Offset of each service inside a chain's port block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ChainPort {
    Proposal = 0,
    Catchup = 1,
    WsJson = 2,
    HttpJson = 3,
    BinaryConsensus = 4,
    ZmqBroadcast = 5,
    ImaMonitoring = 6,
    WssJson = 7,
    HttpsJson = 8,
    InfoHttpJson = 9,
}

/// Base port of a chain on a node, given its index in the node's chain list
pub fn chain_base_port(node_base_port: u16, chain_index: usize) -> Option<u16> {
    let offset = u16::try_from(chain_index)
        .ok()?
        .checked_mul(PORTS_PER_CHAIN)?;
    node_base_port.checked_add(offset)
}

/// Endpoints a node exposes for one chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEndpoints {
    pub ip: Ipv4Addr,
    pub domain: String,
    pub chain_base_port: u16,
}

impl NodeEndpoints {
    fn port(&self, service: ChainPort) -> u16 {
        self.chain_base_port.saturating_add(service as u16)
    }

    /// Endpoint used when resolving `protocol` through a node's domain name
    pub fn endpoint(&self, protocol: Protocol) -> String {
        match protocol {
            Protocol::Http => format!("https://{}:{}", self.domain, self.port(ChainPort::HttpsJson)),
            Protocol::Ws => format!("ws://{}:{}", self.domain, self.port(ChainPort::WsJson)),
        }
    }

    /// Plain HTTP endpoint on the node IP
    pub fn http_ip_endpoint(&self) -> String {
        format!("http://{}:{}", self.ip, self.port(ChainPort::HttpJson))
    }
}

/// Endpoint served by the public proxy for `name`
pub fn proxy_endpoint(domain: &str, name: &UnitName, protocol: Protocol) -> String {
    match protocol {
        Protocol::Http => format!("https://{}/v1/{}", domain, name),
        Protocol::Ws => format!("ws://{}/v1/ws/{}", domain, name),
    }
}

/// Half-open slice `[first, last)` of the registry's chain list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct IndexRange {
    pub first: Option<usize>,
    pub last: Option<usize>,
}

impl IndexRange {
    pub fn new(first: Option<usize>, last: Option<usize>) -> Self {
        Self { first, last }
    }

    /// Apply the range to `items`, clamping out-of-range bounds
    pub fn apply<T>(&self, mut items: Vec<T>) -> Vec<T> {
        let len = items.len();
        let last = self.last.unwrap_or(len).min(len);
        let first = self.first.unwrap_or(0).min(last);
        items.truncate(last);
        items.drain(..first);
        items
    }
}

//! Tracked units and their persisted records
//!
//! A unit is one chain from the registry. Its [`UnitRecord`] is the durable
//! answer to "what was provisioned for this chain"; updates are expressed as a
//! [`UnitPatch`] so fields a caller does not mention are never cleared.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Container name prefix for the explorer application
pub const EXPLORER_CONTAINER_PREFIX: &str = "blockscout_";

/// Container name prefix for the explorer database
pub const DATABASE_CONTAINER_PREFIX: &str = "postgres_";

/// Name of a tracked unit (the chain name assigned by the registry)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitName(String);

/// Rejected unit name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidUnitName {
    #[error("unit name is empty")]
    Empty,

    #[error("unit name {name:?} contains unsupported character {ch:?}")]
    UnsupportedCharacter { name: String, ch: char },
}

impl UnitName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Parse a registry-provided name, rejecting anything that cannot be used
    /// inside a container name or an nginx `server_name`.
    pub fn parse(name: impl Into<String>) -> Result<Self, InvalidUnitName> {
        let name = name.into();
        if name.is_empty() {
            return Err(InvalidUnitName::Empty);
        }
        if let Some(ch) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(InvalidUnitName::UnsupportedCharacter { name, ch });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Container running the explorer web application
    pub fn explorer_container(&self) -> String {
        format!("{}{}", EXPLORER_CONTAINER_PREFIX, self.0)
    }

    /// Container running the explorer database
    pub fn database_container(&self) -> String {
        format!("{}{}", DATABASE_CONTAINER_PREFIX, self.0)
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Endpoint protocol requested from the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Ws,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Ws => f.write_str("ws"),
        }
    }
}

/// Persisted state of a provisioned unit
///
/// The JSON keys match the historical state file: `port`, `db_port`,
/// `endpoint`, `ws_endpoint`, `version`, `verified`, `updated`. Missing
/// `verified` and `updated` decode as `false`, i.e. "not yet done".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawUnitRecord")]
pub struct UnitRecord {
    /// Host port published by the explorer container
    #[serde(rename = "port")]
    pub explorer_port: u16,

    /// Host port published by the database container
    pub db_port: u16,

    /// HTTP JSON-RPC endpoint of the chain
    #[serde(rename = "endpoint")]
    pub rpc_endpoint: String,

    /// WebSocket JSON-RPC endpoint of the chain
    pub ws_endpoint: Option<String>,

    /// Explorer version that was last provisioned
    pub version: Option<String>,

    /// All required contracts are source-verified
    pub verified: bool,

    /// One-time data migration completed
    #[serde(rename = "updated")]
    pub upgraded: bool,
}

impl UnitRecord {
    /// Whether the recorded version differs from `target`
    pub fn is_version_stale(&self, target: &str) -> bool {
        self.version.as_deref() != Some(target)
    }

    /// Local base URL of the explorer
    pub fn explorer_url(&self, host: &str) -> String {
        format!("http://{}:{}", host, self.explorer_port)
    }
}

/// Decoding shape that tolerates the legacy encodings of the state file.
#[derive(Deserialize)]
struct RawUnitRecord {
    #[serde(rename = "port", deserialize_with = "port_serde::deserialize")]
    explorer_port: u16,
    #[serde(deserialize_with = "port_serde::deserialize")]
    db_port: u16,
    #[serde(rename = "endpoint")]
    rpc_endpoint: String,
    #[serde(default)]
    ws_endpoint: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    verified: Option<bool>,
    #[serde(default)]
    contracts_verified: Option<bool>,
    #[serde(default)]
    updated: Option<bool>,
}

impl From<RawUnitRecord> for UnitRecord {
    fn from(raw: RawUnitRecord) -> Self {
        Self {
            explorer_port: raw.explorer_port,
            db_port: raw.db_port,
            rpc_endpoint: raw.rpc_endpoint,
            ws_endpoint: raw.ws_endpoint,
            version: raw.version,
            verified: raw.verified.or(raw.contracts_verified).unwrap_or(false),
            upgraded: raw.updated.unwrap_or(false),
        }
    }
}

/// Ports were historically written both as numbers and as docker's string
/// `HostPort`.
mod port_serde {
    use serde::{de, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u16),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u16, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawPort::deserialize(deserializer)? {
            RawPort::Number(port) => Ok(port),
            RawPort::Text(text) => text.trim().parse().map_err(de::Error::custom),
        }
    }
}

/// Partial update of a [`UnitRecord`]
///
/// `None` fields are left untouched by [`UnitPatch::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitPatch {
    pub explorer_port: Option<u16>,
    pub db_port: Option<u16>,
    pub rpc_endpoint: Option<String>,
    pub ws_endpoint: Option<String>,
    pub version: Option<String>,
    pub verified: Option<bool>,
    pub upgraded: Option<bool>,
}

impl UnitPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn explorer_port(mut self, port: u16) -> Self {
        self.explorer_port = Some(port);
        self
    }

    pub fn db_port(mut self, port: u16) -> Self {
        self.db_port = Some(port);
        self
    }

    pub fn rpc_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.rpc_endpoint = Some(endpoint.into());
        self
    }

    pub fn ws_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.ws_endpoint = endpoint;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn verified(mut self, verified: bool) -> Self {
        self.verified = Some(verified);
        self
    }

    pub fn upgraded(mut self, upgraded: bool) -> Self {
        self.upgraded = Some(upgraded);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merge into an existing record
    pub fn apply(&self, record: &mut UnitRecord) {
        if let Some(port) = self.explorer_port {
            record.explorer_port = port;
        }
        if let Some(port) = self.db_port {
            record.db_port = port;
        }
        if let Some(endpoint) = &self.rpc_endpoint {
            record.rpc_endpoint = endpoint.clone();
        }
        if let Some(endpoint) = &self.ws_endpoint {
            record.ws_endpoint = Some(endpoint.clone());
        }
        if let Some(version) = &self.version {
            record.version = Some(version.clone());
        }
        if let Some(verified) = self.verified {
            record.verified = verified;
        }
        if let Some(upgraded) = self.upgraded {
            record.upgraded = upgraded;
        }
    }

    /// Build a fresh record. Returns `None` unless both ports and the RPC
    /// endpoint are present.
    pub fn into_record(self) -> Option<UnitRecord> {
        Some(UnitRecord {
            explorer_port: self.explorer_port?,
            db_port: self.db_port?,
            rpc_endpoint: self.rpc_endpoint?,
            ws_endpoint: self.ws_endpoint,
            version: self.version,
            verified: self.verified.unwrap_or(false),
            upgraded: self.upgraded.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_names() {
        let name = UnitName::new("elated-tan-skat");
        assert_eq!(name.explorer_container(), "blockscout_elated-tan-skat");
        assert_eq!(name.database_container(), "postgres_elated-tan-skat");
    }

    #[test]
    fn test_parse_rejects_unsafe_names() {
        assert_eq!(UnitName::parse(""), Err(InvalidUnitName::Empty));
        assert!(UnitName::parse("alpha beta").is_err());
        assert!(UnitName::parse("alpha;").is_err());
        assert!(UnitName::parse("alpha-1_b.c").is_ok());
    }

    #[test]
    fn test_legacy_record_decodes_with_defaults() {
        let record: UnitRecord = serde_json::from_str(
            r#"{"port": 4001, "db_port": "49153", "endpoint": "https://node:10008", "ws_endpoint": null, "extra": 1}"#,
        )
        .unwrap();

        assert_eq!(record.explorer_port, 4001);
        assert_eq!(record.db_port, 49153);
        assert_eq!(record.ws_endpoint, None);
        assert_eq!(record.version, None);
        assert!(!record.verified);
        assert!(!record.upgraded);
    }

    #[test]
    fn test_contracts_verified_alias() {
        let record: UnitRecord = serde_json::from_str(
            r#"{"port": 1, "db_port": 2, "endpoint": "e", "contracts_verified": true}"#,
        )
        .unwrap();
        assert!(record.verified);
    }

    #[test]
    fn test_record_serializes_historical_keys() {
        let record = UnitPatch::new()
            .explorer_port(4001)
            .db_port(5432)
            .rpc_endpoint("http://rpc")
            .version("7.0.0")
            .upgraded(true)
            .into_record()
            .unwrap();

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["port"], 4001);
        assert_eq!(value["db_port"], 5432);
        assert_eq!(value["endpoint"], "http://rpc");
        assert_eq!(value["updated"], true);
        assert_eq!(value["verified"], false);
    }

    #[test]
    fn test_patch_preserves_unspecified_fields() {
        let mut record = UnitPatch::new()
            .explorer_port(1)
            .db_port(2)
            .rpc_endpoint("http://rpc")
            .ws_endpoint(Some("ws://rpc".into()))
            .version("1")
            .into_record()
            .unwrap();

        UnitPatch::new().verified(true).apply(&mut record);

        assert!(record.verified);
        assert_eq!(record.explorer_port, 1);
        assert_eq!(record.ws_endpoint.as_deref(), Some("ws://rpc"));
        assert_eq!(record.version.as_deref(), Some("1"));
    }

    #[test]
    fn test_incomplete_patch_is_not_a_record() {
        assert!(UnitPatch::new().explorer_port(1).into_record().is_none());
        assert!(UnitPatch::new().is_empty());
    }

    #[test]
    fn test_version_staleness() {
        let mut record = UnitPatch::new()
            .explorer_port(1)
            .db_port(2)
            .rpc_endpoint("e")
            .into_record()
            .unwrap();
        assert!(record.is_version_stale("7.0.0"));
        record.version = Some("7.0.0".into());
        assert!(!record.is_version_stale("7.0.0"));
    }
}

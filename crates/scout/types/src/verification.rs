//! Contract verification types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compiler metadata needed to verify one predeployed contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractMeta {
    /// Contract name as known to the compiler
    pub name: String,

    /// Full solc version, e.g. `0.8.11+commit.d7f03943`
    #[serde(rename = "solcLongVersion")]
    pub solc_long_version: String,

    /// Standard JSON input given to the compiler
    pub input: serde_json::Value,
}

impl ContractMeta {
    /// Compiler version string in the form the explorer expects
    pub fn compiler_version(&self) -> String {
        format!("v{}", self.solc_long_version)
    }
}

/// Opaque token returned by the explorer for a queued verification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationToken(String);

impl VerificationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VerificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a queued verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollStatus {
    Pass,
    Fail(String),
    Pending,
    UnknownUid,
}

impl PollStatus {
    /// Interpret the `result` string of a `checkverifystatus` response
    pub fn from_explorer(result: &str) -> Self {
        let result = result.trim();
        if result.starts_with("Pass") {
            PollStatus::Pass
        } else if result.starts_with("Fail") {
            PollStatus::Fail(result.to_string())
        } else if result.eq_ignore_ascii_case("Unknown UID") {
            PollStatus::UnknownUid
        } else {
            PollStatus::Pending
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PollStatus::Pass | PollStatus::Fail(_))
    }
}

/// Canonical form used to compare addresses from different sources
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

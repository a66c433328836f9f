//! Scout Verify - Source verification of predeployed contracts
//!
//! Each explorer must report every predeployed contract of its chain as
//! source-verified. The [`Verifier`] diffs the required set against what the
//! explorer reports, submits the difference and polls each submission for a
//! bounded number of attempts.

#![deny(unsafe_code)]

pub mod blockscout;
pub mod catalog;
pub mod error;
pub mod memory;
pub mod traits;
pub mod verifier;

pub use blockscout::BlockscoutClient;
pub use catalog::{ConfigDirCatalog, ContractCatalog, RequiredContracts, StaticCatalog};
pub use error::{Result, VerifyError};
pub use memory::{MemoryVerificationClient, PollBehavior};
pub use traits::{ExplorerHandle, VerificationClient};
pub use verifier::{ContractState, VerificationPolicy, VerificationReport, Verifier};

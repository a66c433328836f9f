//! Scout Types - Core types for explorer fleet reconciliation
//!
//! Scout keeps one block explorer (explorer container, database container and
//! reverse-proxy route) running for every chain listed in an on-chain
//! registry. The types in this crate are shared by the adapters and the
//! reconciliation engine.
//!
//! ## Key Concepts
//!
//! - **Unit**: one tracked chain, identified by its [`UnitName`]
//! - **UnitRecord**: what has been provisioned for a unit, persisted by the store
//! - **UnitPatch**: a partial update merged into a record
//! - **LaunchSpec**: adapter-neutral description of a container to start
//! - **Events**: lifecycle transitions broadcast by the engine

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod container;
pub mod events;
pub mod unit;
pub mod verification;

pub use container::{ContainerStatus, LaunchSpec, PortBinding, VolumeMount};
pub use events::{AgentEvent, AgentEventEnvelope, EventSeverity};
pub use unit::{InvalidUnitName, Protocol, UnitName, UnitPatch, UnitRecord};
pub use verification::{normalize_address, ContractMeta, PollStatus, VerificationToken};

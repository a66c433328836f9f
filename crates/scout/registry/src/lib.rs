//! Scout Registry - Chain membership and endpoint discovery
//!
//! The registry is the authoritative, read-only source of which chains exist,
//! whether their key-generation ceremony has completed (the readiness gate),
//! and where their JSON-RPC endpoints live.
//!
//! [`SkaleManagerRegistry`] reads the SKALE manager contracts over JSON-RPC.
//! [`MemoryRegistry`] is an in-memory stand-in for development and testing.

#![deny(unsafe_code)]

pub mod addresses;
pub mod endpoints;
pub mod error;
pub mod memory;
pub mod skale;
pub mod traits;

pub use addresses::RegistryAddresses;
pub use endpoints::{IndexRange, NodeEndpoints};
pub use error::{RegistryError, Result};
pub use memory::MemoryRegistry;
pub use skale::{SkaleManagerRegistry, SkaleRegistryConfig};
pub use traits::Registry;

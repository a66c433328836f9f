//! Scout Store - Durable record of provisioned units
//!
//! The store is the single source of truth for "is this unit provisioned".
//! It holds one [`UnitRecord`](scout_types::UnitRecord) per unit name and
//! survives process restarts.
//!
//! Two backends are provided:
//! - [`JsonFileStore`]: the JSON state file, replaced atomically on every write
//! - [`InMemoryStore`]: for development and testing

#![deny(unsafe_code)]

pub mod error;
pub mod file;
pub mod memory;
pub mod table;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::JsonFileStore;
pub use memory::InMemoryStore;
pub use table::{MalformedRecord, UnitTable};
pub use traits::MetadataStore;

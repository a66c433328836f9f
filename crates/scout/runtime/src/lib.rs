//! Scout Runtime - Container lifecycle for explorer units
//!
//! The runtime is the source of truth for "is this unit healthy". It starts,
//! inspects, restarts and removes named containers described by a
//! [`LaunchSpec`](scout_types::LaunchSpec).
//!
//! - [`DockerCli`]: drives the local docker daemon through its CLI
//! - [`MemoryRuntime`]: in-memory stand-in for development and testing
//! - [`ExplorerTemplate`]: launch specs for the explorer and its database

#![deny(unsafe_code)]

pub mod docker;
pub mod error;
pub mod memory;
pub mod template;
pub mod traits;

pub use docker::DockerCli;
pub use error::{Result, RuntimeError};
pub use memory::MemoryRuntime;
pub use template::{ExplorerParams, ExplorerTemplate};
pub use traits::ContainerRuntime;

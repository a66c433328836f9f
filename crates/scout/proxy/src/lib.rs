//! Scout Proxy - Reverse-proxy routes for explorer units
//!
//! Every provisioned unit gets a route `<name>.*` pointing at its explorer
//! port. The configuration is always rendered from the full set of records,
//! so it is deterministic and each unit's block is self-contained.

#![deny(unsafe_code)]

pub mod error;
pub mod memory;
pub mod nginx;
pub mod traits;

pub use error::{ProxyError, Result};
pub use memory::RecordingProxy;
pub use nginx::{render, Directive, NginxConfigurer, NginxOptions, SslPaths};
pub use traits::ProxyConfigurer;

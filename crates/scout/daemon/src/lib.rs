//! Scout daemon library
//!
//! This module provides the core components of the Scout agent:
//! - Reconciliation engine and its per-unit decision function
//! - Fixed-interval scheduler with on-demand triggers
//! - One-time database migration
//! - Status API
//! - Agent lifecycle management

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod migration;
pub mod scheduler;
pub mod server;

pub use config::AgentConfig;
pub use engine::{Engine, EngineDeps, EngineSettings, IterationReport, UnitOutcome};
pub use error::{ApiError, DaemonError, EngineError, MigrationError};
pub use scheduler::Scheduler;
pub use server::Server;

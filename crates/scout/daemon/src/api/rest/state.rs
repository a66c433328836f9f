//! Application state for API handlers

use crate::engine::Engine;
use crate::scheduler::Scheduler;
use scout_store::MetadataStore;
use scout_types::AgentEventEnvelope;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Metadata store
    pub store: Arc<dyn MetadataStore>,

    /// Reconciliation engine
    pub engine: Arc<Engine>,

    /// Scheduler handle
    pub scheduler: Arc<Scheduler>,

    /// Event broadcast channel
    pub event_tx: broadcast::Sender<AgentEventEnvelope>,

    /// Agent version
    pub version: String,

    /// Agent start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        store: Arc<dyn MetadataStore>,
        engine: Arc<Engine>,
        scheduler: Arc<Scheduler>,
        event_tx: broadcast::Sender<AgentEventEnvelope>,
    ) -> Self {
        Self {
            store,
            engine,
            scheduler,
            event_tx,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let duration = chrono::Utc::now() - self.started_at;
        let secs = duration.num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}

//! Event types for Scout observability
//!
//! Events mirror the structured log lines emitted on every unit transition
//! and are broadcast to in-process subscribers such as the status API.

use crate::UnitName;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all agent events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Event severity
    pub severity: EventSeverity,

    /// Iteration that produced the event
    pub iteration: Option<u64>,

    /// The actual event
    pub event: AgentEvent,
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
}

/// Agent events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentEvent {
    /// Iteration started
    IterationStarted { iteration: u64, units: usize },

    /// Iteration finished
    IterationCompleted {
        iteration: u64,
        failed: usize,
        duration_ms: u64,
    },

    /// Unit skipped because its readiness gate has not passed
    UnitGated { unit: UnitName },

    /// Provisioning started
    ProvisionStarted { unit: UnitName },

    /// Provisioning finished and recorded
    ProvisionCompleted {
        unit: UnitName,
        explorer_port: u16,
        db_port: u16,
    },

    /// Repair triggered
    RepairTriggered { unit: UnitName, reason: String },

    /// One-time migration finished
    MigrationCompleted { unit: UnitName },

    /// Verification request submitted
    VerificationSubmitted { unit: UnitName, address: String },

    /// All required contracts verified
    UnitVerified { unit: UnitName, contracts: usize },

    /// Verification ran but coverage is still partial
    VerificationIncomplete {
        unit: UnitName,
        verified: usize,
        required: usize,
    },

    /// A unit action failed; state left unchanged
    ActionFailed {
        unit: UnitName,
        action: String,
        error: String,
    },
}

impl AgentEventEnvelope {
    /// Create a new event envelope
    pub fn new(event: AgentEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            severity: Self::infer_severity(&event),
            iteration: None,
            event,
        }
    }

    /// Attach the iteration counter
    pub fn with_iteration(mut self, iteration: u64) -> Self {
        self.iteration = Some(iteration);
        self
    }

    /// Infer severity from event type
    fn infer_severity(event: &AgentEvent) -> EventSeverity {
        match event {
            AgentEvent::ActionFailed { .. } => EventSeverity::Error,

            AgentEvent::RepairTriggered { .. } | AgentEvent::VerificationIncomplete { .. } => {
                EventSeverity::Warning
            }

            _ => EventSeverity::Info,
        }
    }
}

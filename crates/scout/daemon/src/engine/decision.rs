//! Per-unit decision function

use scout_types::{ContainerStatus, UnitRecord};
use serde::Serialize;
use std::fmt;

/// What the engine observed about one unit
///
/// Container statuses are only consulted once a record exists.
#[derive(Debug, Clone)]
pub struct Observation {
    pub gate_passed: bool,
    pub record: Option<UnitRecord>,
    pub explorer: ContainerStatus,
    pub database: ContainerStatus,
}

/// Why a provisioned unit needs repair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepairReason {
    ExplorerDown { status: ContainerStatus },
    DatabaseDown { status: ContainerStatus },
    VersionDrift { recorded: Option<String>, target: String },
}

impl fmt::Display for RepairReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairReason::ExplorerDown { status } => write!(f, "explorer container {}", status),
            RepairReason::DatabaseDown { status } => write!(f, "database container {}", status),
            RepairReason::VersionDrift { recorded, target } => write!(
                f,
                "version {} differs from target {}",
                recorded.as_deref().unwrap_or("<none>"),
                target
            ),
        }
    }
}

/// Action chosen for a unit in one iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitAction {
    Skip,
    Provision,
    Repair(RepairReason),
    Migrate,
    Verify,
    Noop,
}

impl UnitAction {
    pub fn label(&self) -> &'static str {
        match self {
            UnitAction::Skip => "skip",
            UnitAction::Provision => "provision",
            UnitAction::Repair(_) => "repair",
            UnitAction::Migrate => "migrate",
            UnitAction::Verify => "verify",
            UnitAction::Noop => "noop",
        }
    }
}

/// First matching rule wins: gate, absence, health and version, a pending
/// migration, verification.
pub fn decide(observation: &Observation, target_version: &str) -> UnitAction {
    if !observation.gate_passed {
        return UnitAction::Skip;
    }

    let Some(record) = &observation.record else {
        return UnitAction::Provision;
    };

    if !observation.explorer.is_running() {
        return UnitAction::Repair(RepairReason::ExplorerDown {
            status: observation.explorer.clone(),
        });
    }
    if !observation.database.is_running() {
        return UnitAction::Repair(RepairReason::DatabaseDown {
            status: observation.database.clone(),
        });
    }
    if record.is_version_stale(target_version) {
        return UnitAction::Repair(RepairReason::VersionDrift {
            recorded: record.version.clone(),
            target: target_version.to_string(),
        });
    }

    // Healthy units finish a pending migration before verifying.
    if !record.upgraded {
        return UnitAction::Migrate;
    }

    if !record.verified {
        return UnitAction::Verify;
    }

    UnitAction::Noop
}

//! Reconciliation engine
//!
//! One iteration lists the registry's chains and, per unit, observes the
//! store and the runtime, picks an action with [`decide`] and applies it.
//! Unit failures are isolated: they are logged, reported and retried on the
//! next iteration with recorded state left as it was.

mod decision;
mod ports;

pub use decision::{decide, Observation, RepairReason, UnitAction};
pub use ports::{InFlight, InFlightGuard, PortAllocator, PortLease};

use crate::error::{EngineError, EngineResult};
use crate::migration::Migration;
use futures::stream::{self, StreamExt};
use scout_proxy::ProxyConfigurer;
use scout_registry::Registry;
use scout_runtime::{ContainerRuntime, ExplorerParams, ExplorerTemplate};
use scout_store::MetadataStore;
use scout_types::{
    AgentEvent, AgentEventEnvelope, ContainerStatus, Protocol, UnitName, UnitPatch, UnitRecord,
};
use scout_verify::{ContractCatalog, ExplorerHandle, Verifier};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, RwLock};

/// Engine knobs derived from configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Explorer version every unit should run
    pub target_version: String,

    /// Host the explorers' published ports are reachable on
    pub explorer_host: String,

    /// Upper bound for each registry, runtime and proxy call
    pub call_timeout: Duration,

    /// Upper bound for one migration run
    pub migration_timeout: Duration,

    /// Units processed at the same time
    pub max_concurrent_units: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            target_version: String::new(),
            explorer_host: "127.0.0.1".to_string(),
            call_timeout: Duration::from_secs(120),
            migration_timeout: Duration::from_secs(1800),
            max_concurrent_units: 1,
        }
    }
}

/// Adapters the engine drives
#[derive(Clone)]
pub struct EngineDeps {
    pub registry: Arc<dyn Registry>,
    pub store: Arc<dyn MetadataStore>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub proxy: Arc<dyn ProxyConfigurer>,
    pub verifier: Verifier,
    pub catalog: Arc<dyn ContractCatalog>,
    pub migration: Arc<dyn Migration>,
    pub template: ExplorerTemplate,
}

/// What happened to one unit in an iteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitOutcome {
    pub unit: UnitName,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UnitOutcome {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Summary of one iteration
#[derive(Debug, Clone, Serialize)]
pub struct IterationReport {
    pub iteration: u64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
    pub outcomes: Vec<UnitOutcome>,
    pub failed: usize,
}

impl IterationReport {
    pub fn outcome(&self, name: &str) -> Option<&UnitOutcome> {
        self.outcomes.iter().find(|o| o.unit.as_str() == name)
    }
}

/// Reconciliation engine
pub struct Engine {
    deps: EngineDeps,
    settings: EngineSettings,
    event_tx: broadcast::Sender<AgentEventEnvelope>,
    iteration: AtomicU64,
    last_report: RwLock<Option<IterationReport>>,
    proxy_dirty: AtomicBool,
    proxy_lock: Mutex<()>,
    ports: PortAllocator,
    inflight: InFlight,
}

impl Engine {
    pub fn new(
        deps: EngineDeps,
        settings: EngineSettings,
        event_tx: broadcast::Sender<AgentEventEnvelope>,
    ) -> Self {
        Self {
            deps,
            settings,
            event_tx,
            iteration: AtomicU64::new(0),
            last_report: RwLock::new(None),
            proxy_dirty: AtomicBool::new(false),
            proxy_lock: Mutex::new(()),
            ports: PortAllocator::new(),
            inflight: InFlight::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Number of iterations started so far
    pub fn iterations(&self) -> u64 {
        self.iteration.load(Ordering::SeqCst)
    }

    pub async fn last_report(&self) -> Option<IterationReport> {
        self.last_report.read().await.clone()
    }

    /// Whether the last proxy update failed and is pending a retry
    pub fn proxy_dirty(&self) -> bool {
        self.proxy_dirty.load(Ordering::SeqCst)
    }

    /// Run one pass over every chain in the registry
    pub async fn run_iteration(&self) -> EngineResult<IterationReport> {
        let iteration = self.iteration.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = chrono::Utc::now();
        let start = Instant::now();

        let listed = self
            .call("list_chain_names", self.deps.registry.list_chain_names())
            .await?;
        let mut seen = HashSet::new();
        let names: Vec<UnitName> = listed
            .into_iter()
            .filter(|name| seen.insert(name.clone()))
            .collect();

        tracing::info!(iteration, units = names.len(), "Iteration started");
        self.emit(
            iteration,
            AgentEvent::IterationStarted {
                iteration,
                units: names.len(),
            },
        );

        let mut outcomes: Vec<UnitOutcome> = stream::iter(names)
            .map(|name| self.reconcile_unit(name, iteration))
            .buffer_unordered(self.settings.max_concurrent_units.max(1))
            .collect()
            .await;
        outcomes.sort_by(|a, b| a.unit.cmp(&b.unit));

        if self.proxy_dirty() {
            tracing::info!(iteration, "Retrying proxy update");
            if let Err(e) = self.sync_proxy().await {
                tracing::error!(iteration, error = %e, "Proxy update failed again");
            }
        }

        let failed = outcomes.iter().filter(|o| o.is_failure()).count();
        let duration_ms = start.elapsed().as_millis() as u64;
        let report = IterationReport {
            iteration,
            started_at,
            duration_ms,
            outcomes,
            failed,
        };

        tracing::info!(iteration, failed, duration_ms, "Iteration completed");
        self.emit(
            iteration,
            AgentEvent::IterationCompleted {
                iteration,
                failed,
                duration_ms,
            },
        );

        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    async fn reconcile_unit(&self, name: UnitName, iteration: u64) -> UnitOutcome {
        let Some(_guard) = self.inflight.try_acquire(&name) else {
            tracing::debug!(unit = %name, "Action already in flight");
            return UnitOutcome {
                unit: name,
                action: "busy".to_string(),
                reason: None,
                error: None,
            };
        };

        let action = match self.observe(&name).await {
            Ok(observation) => decide(&observation, &self.settings.target_version),
            Err(e) => return self.failed(name, "observe", None, e, iteration),
        };

        let reason = match &action {
            UnitAction::Repair(reason) => Some(reason.to_string()),
            _ => None,
        };

        let result = match &action {
            UnitAction::Skip => {
                tracing::debug!(unit = %name, "Readiness gate not passed");
                self.emit(iteration, AgentEvent::UnitGated { unit: name.clone() });
                Ok(())
            }
            UnitAction::Provision => self.provision(&name, iteration).await.map(|_| ()),
            UnitAction::Repair(reason) => self.repair(&name, reason, iteration).await,
            UnitAction::Migrate => self.retry_migration(&name, iteration).await,
            UnitAction::Verify => self.verify(&name, iteration).await,
            UnitAction::Noop => Ok(()),
        };

        match result {
            Ok(()) => UnitOutcome {
                unit: name,
                action: action.label().to_string(),
                reason,
                error: None,
            },
            Err(e) => self.failed(name, action.label(), reason, e, iteration),
        }
    }

    fn failed(
        &self,
        name: UnitName,
        action: &str,
        reason: Option<String>,
        error: EngineError,
        iteration: u64,
    ) -> UnitOutcome {
        tracing::error!(unit = %name, action, error = %error, "Unit action failed");
        self.emit(
            iteration,
            AgentEvent::ActionFailed {
                unit: name.clone(),
                action: action.to_string(),
                error: error.to_string(),
            },
        );
        UnitOutcome {
            unit: name,
            action: action.to_string(),
            reason,
            error: Some(error.to_string()),
        }
    }

    async fn observe(&self, name: &UnitName) -> EngineResult<Observation> {
        let gate_passed = self
            .call(
                "readiness_gate",
                self.deps.registry.is_readiness_gate_passed(name),
            )
            .await?;
        if !gate_passed {
            return Ok(Observation {
                gate_passed,
                record: None,
                explorer: ContainerStatus::NotFound,
                database: ContainerStatus::NotFound,
            });
        }

        let record = self.deps.store.get(name).await?;
        let (explorer, database) = if record.is_some() {
            (
                self.container_status(&name.explorer_container()).await?,
                self.container_status(&name.database_container()).await?,
            )
        } else {
            (ContainerStatus::NotFound, ContainerStatus::NotFound)
        };

        Ok(Observation {
            gate_passed,
            record,
            explorer,
            database,
        })
    }

    /// Bring up the unit's containers and record the result.
    ///
    /// Running containers are kept; an existing record keeps its endpoints
    /// and ports and only gets the target version.
    async fn provision(&self, name: &UnitName, iteration: u64) -> EngineResult<UnitRecord> {
        tracing::info!(unit = %name, version = %self.settings.target_version, "Provisioning explorer");
        self.emit(iteration, AgentEvent::ProvisionStarted { unit: name.clone() });

        let existing = self.deps.store.get(name).await?;
        let (rpc_endpoint, ws_endpoint) = match &existing {
            Some(record) => (record.rpc_endpoint.clone(), record.ws_endpoint.clone()),
            None => self.resolve_endpoints(name).await?,
        };

        let mut lease = self.ports.lease();
        let mut used = self.deps.store.load().await?.used_ports();

        let (db_port, db_preexisted) = self
            .ensure_database(name, existing.as_ref(), &mut lease, &used)
            .await?;
        used.insert(db_port);

        let explorer_port = self
            .ensure_explorer(
                name,
                existing.as_ref(),
                &mut lease,
                &used,
                db_port,
                &rpc_endpoint,
                ws_endpoint.as_deref(),
            )
            .await?;

        let mut patch = UnitPatch::new()
            .explorer_port(explorer_port)
            .db_port(db_port)
            .rpc_endpoint(rpc_endpoint)
            .ws_endpoint(ws_endpoint)
            .version(self.settings.target_version.clone());
        if existing.is_none() {
            patch = patch.verified(false).upgraded(!db_preexisted);
        }
        let record = self.deps.store.upsert(name, patch).await?;
        lease.commit();

        tracing::info!(unit = %name, explorer_port, db_port, "Explorer provisioned");
        self.emit(
            iteration,
            AgentEvent::ProvisionCompleted {
                unit: name.clone(),
                explorer_port,
                db_port,
            },
        );

        self.sync_proxy().await?;
        Ok(record)
    }

    async fn resolve_endpoints(&self, name: &UnitName) -> EngineResult<(String, Option<String>)> {
        let rpc = self
            .call(
                "resolve_endpoint",
                self.deps.registry.resolve_endpoint(name, Protocol::Http),
            )
            .await?
            .ok_or_else(|| EngineError::NoEndpoint {
                unit: name.clone(),
                protocol: Protocol::Http,
            })?;

        let ws = self
            .call(
                "resolve_endpoint",
                self.deps.registry.resolve_endpoint(name, Protocol::Ws),
            )
            .await?;
        if ws.is_none() {
            tracing::warn!(unit = %name, "No websocket endpoint, explorer will poll over http");
        }

        Ok((rpc, ws))
    }

    /// Returns the database port and whether the container already existed
    async fn ensure_database(
        &self,
        name: &UnitName,
        existing: Option<&UnitRecord>,
        lease: &mut PortLease,
        used: &HashSet<u16>,
    ) -> EngineResult<(u16, bool)> {
        let container = name.database_container();
        let status = self.container_status(&container).await?;

        if status.exists() {
            if !status.is_running() {
                tracing::info!(unit = %name, %status, "Restarting database container");
                self.call("restart_database", self.deps.runtime.restart(&container))
                    .await?;
            }
            let port = self
                .call(
                    "published_port",
                    self.deps.runtime.published_port(&container),
                )
                .await?
                .or(existing.map(|r| r.db_port))
                .ok_or_else(|| {
                    EngineError::PortAllocation(format!("{} publishes no port", container))
                })?;
            lease.reserve(port);
            return Ok((port, true));
        }

        let port = match existing {
            Some(record) => {
                lease.reserve(record.db_port);
                record.db_port
            }
            None => lease.allocate(used)?,
        };
        tracing::info!(unit = %name, db_port = port, "Starting database container");
        self.call(
            "start_database",
            self.deps
                .runtime
                .start(&self.deps.template.database(name, port)),
        )
        .await?;
        Ok((port, false))
    }

    #[allow(clippy::too_many_arguments)]
    async fn ensure_explorer(
        &self,
        name: &UnitName,
        existing: Option<&UnitRecord>,
        lease: &mut PortLease,
        used: &HashSet<u16>,
        db_port: u16,
        rpc_endpoint: &str,
        ws_endpoint: Option<&str>,
    ) -> EngineResult<u16> {
        let container = name.explorer_container();
        let status = self.container_status(&container).await?;

        if status.is_running() {
            let port = self
                .call(
                    "published_port",
                    self.deps.runtime.published_port(&container),
                )
                .await?
                .or(existing.map(|r| r.explorer_port))
                .ok_or_else(|| {
                    EngineError::PortAllocation(format!("{} publishes no port", container))
                })?;
            tracing::debug!(unit = %name, explorer_port = port, "Explorer already running");
            lease.reserve(port);
            return Ok(port);
        }

        if status.exists() {
            self.call("remove_explorer", self.deps.runtime.remove(&container))
                .await?;
        }

        let port = match existing {
            Some(record) => {
                lease.reserve(record.explorer_port);
                record.explorer_port
            }
            None => lease.allocate(used)?,
        };

        let spec = self.deps.template.explorer(&ExplorerParams {
            name,
            version: &self.settings.target_version,
            explorer_port: port,
            db_port,
            rpc_endpoint,
            ws_endpoint,
        });
        tracing::info!(unit = %name, explorer_port = port, image = %spec.image, "Starting explorer container");
        self.call("start_explorer", self.deps.runtime.start(&spec))
            .await?;
        Ok(port)
    }

    /// Migrate once if needed, drop the explorer container and provision again
    async fn repair(
        &self,
        name: &UnitName,
        reason: &RepairReason,
        iteration: u64,
    ) -> EngineResult<()> {
        tracing::warn!(unit = %name, %reason, "Repairing explorer");
        self.emit(
            iteration,
            AgentEvent::RepairTriggered {
                unit: name.clone(),
                reason: reason.to_string(),
            },
        );

        let record = self
            .deps
            .store
            .get(name)
            .await?
            .ok_or_else(|| EngineError::MissingRecord(name.clone()))?;

        if !record.upgraded {
            if let Err(e) = self.migrate(name, &record, iteration).await {
                tracing::warn!(unit = %name, error = %e, "Migration failed, repairing anyway");
            }
        }

        self.call(
            "remove_explorer",
            self.deps.runtime.remove(&name.explorer_container()),
        )
        .await?;

        self.provision(name, iteration).await.map(|_| ())
    }

    /// Run the migration on a healthy unit that has not completed it
    async fn retry_migration(&self, name: &UnitName, iteration: u64) -> EngineResult<()> {
        let record = self
            .deps
            .store
            .get(name)
            .await?
            .ok_or_else(|| EngineError::MissingRecord(name.clone()))?;
        self.migrate(name, &record, iteration).await
    }

    async fn migrate(&self, name: &UnitName, record: &UnitRecord, iteration: u64) -> EngineResult<()> {
        let migration = self.deps.migration.name();
        tracing::info!(unit = %name, migration, "Running migration");

        let touched = match tokio::time::timeout(
            self.settings.migration_timeout,
            self.deps.migration.run(name, record),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(EngineError::Timeout {
                    operation: "migration",
                    after: self.settings.migration_timeout,
                })
            }
        };

        self.deps
            .store
            .upsert(name, UnitPatch::new().upgraded(true))
            .await?;
        tracing::info!(unit = %name, migration, rows = touched, "Migration completed");
        self.emit(iteration, AgentEvent::MigrationCompleted { unit: name.clone() });
        Ok(())
    }

    /// Verify the unit's required contracts; mark it only on full coverage
    async fn verify(&self, name: &UnitName, iteration: u64) -> EngineResult<()> {
        let record = self
            .deps
            .store
            .get(name)
            .await?
            .ok_or_else(|| EngineError::MissingRecord(name.clone()))?;
        let required = self.deps.catalog.required_contracts(name).await?;

        let target = ExplorerHandle::new(
            name.clone(),
            record.explorer_url(&self.settings.explorer_host),
        );
        let report = self.deps.verifier.verify(&target, &required).await;

        for address in &report.submitted {
            self.emit(
                iteration,
                AgentEvent::VerificationSubmitted {
                    unit: name.clone(),
                    address: address.clone(),
                },
            );
        }

        if report.is_complete() {
            self.deps
                .store
                .upsert(name, UnitPatch::new().verified(true))
                .await?;
            tracing::info!(unit = %name, contracts = report.required, "All contracts verified");
            self.emit(
                iteration,
                AgentEvent::UnitVerified {
                    unit: name.clone(),
                    contracts: report.required,
                },
            );
        } else {
            tracing::info!(
                unit = %name,
                verified = report.verified,
                required = report.required,
                "Verification incomplete"
            );
            self.emit(
                iteration,
                AgentEvent::VerificationIncomplete {
                    unit: name.clone(),
                    verified: report.verified,
                    required: report.required,
                },
            );
        }
        Ok(())
    }

    /// Regenerate the proxy configuration from the full store and reload it
    async fn sync_proxy(&self) -> EngineResult<()> {
        let _lock = self.proxy_lock.lock().await;
        let result = self.write_proxy().await;
        self.proxy_dirty.store(result.is_err(), Ordering::SeqCst);
        result
    }

    async fn write_proxy(&self) -> EngineResult<()> {
        let table = self.deps.store.load().await?;
        self.call("proxy_regenerate", self.deps.proxy.regenerate(&table.records))
            .await?;
        self.call("proxy_reload", self.deps.proxy.reload()).await
    }

    async fn container_status(&self, container: &str) -> EngineResult<ContainerStatus> {
        self.call("container_status", self.deps.runtime.status(container))
            .await
    }

    /// Await `fut` for at most the call timeout
    async fn call<T, E, F>(&self, operation: &'static str, fut: F) -> EngineResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<EngineError>,
    {
        match tokio::time::timeout(self.settings.call_timeout, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(EngineError::Timeout {
                operation,
                after: self.settings.call_timeout,
            }),
        }
    }

    fn emit(&self, iteration: u64, event: AgentEvent) {
        // No subscribers is fine.
        let _ = self
            .event_tx
            .send(AgentEventEnvelope::new(event).with_iteration(iteration));
    }
}

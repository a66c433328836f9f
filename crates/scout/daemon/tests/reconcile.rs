//! End-to-end reconciliation scenarios over the in-memory adapters

use async_trait::async_trait;
use scout_daemon::engine::{Engine, EngineDeps, EngineSettings};
use scout_daemon::error::MigrationError;
use scout_daemon::migration::Migration;
use scout_daemon::scheduler::Scheduler;
use scout_proxy::RecordingProxy;
use scout_registry::MemoryRegistry;
use scout_runtime::{ContainerRuntime, ExplorerTemplate, MemoryRuntime};
use scout_store::{InMemoryStore, MalformedRecord, MetadataStore, UnitTable};
use scout_types::{
    AgentEvent, AgentEventEnvelope, ContainerStatus, ContractMeta, Protocol, UnitName, UnitRecord,
};
use scout_verify::{
    MemoryVerificationClient, PollBehavior, RequiredContracts, StaticCatalog, VerificationPolicy,
    Verifier,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

const VERSION: &str = "6.3.0";
const PREDEPLOYED: &str = "0xD2aAa00100000000000000000000000000000000";

#[derive(Default)]
struct CountingMigration {
    runs: AtomicUsize,
    fails: AtomicBool,
}

#[async_trait]
impl Migration for CountingMigration {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn run(&self, _name: &UnitName, _record: &UnitRecord) -> Result<u64, MigrationError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fails.load(Ordering::SeqCst) {
            return Err(MigrationError::Rpc("receipt unavailable".into()));
        }
        Ok(0)
    }
}

/// In-memory adapters shared by every engine a test builds
struct Adapters {
    registry: Arc<MemoryRegistry>,
    store: Arc<InMemoryStore>,
    runtime: Arc<MemoryRuntime>,
    proxy: Arc<RecordingProxy>,
    client: Arc<MemoryVerificationClient>,
    catalog: Arc<StaticCatalog>,
    migration: Arc<CountingMigration>,
    shutdown_tx: watch::Sender<bool>,
    event_tx: broadcast::Sender<AgentEventEnvelope>,
}

impl Adapters {
    fn engine_for(&self, version: &str, max_concurrent_units: usize) -> Engine {
        let verifier = Verifier::new(
            self.client.clone(),
            VerificationPolicy {
                poll_interval: Duration::from_millis(1),
                max_poll_attempts: 3,
            },
            self.shutdown_tx.subscribe(),
        );
        let deps = EngineDeps {
            registry: self.registry.clone(),
            store: self.store.clone(),
            runtime: self.runtime.clone(),
            proxy: self.proxy.clone(),
            verifier,
            catalog: self.catalog.clone(),
            migration: self.migration.clone(),
            template: ExplorerTemplate::default(),
        };
        let settings = EngineSettings {
            target_version: version.to_string(),
            call_timeout: Duration::from_secs(5),
            migration_timeout: Duration::from_secs(5),
            max_concurrent_units,
            ..EngineSettings::default()
        };
        Engine::new(deps, settings, self.event_tx.clone())
    }

    /// Register a ready chain with one predeployed contract
    fn add_chain(&self, name: &str) {
        self.registry.add_chain(
            name,
            true,
            &format!("https://{}.rpc.test", name),
            &format!("wss://{}.rpc.test", name),
        );
        self.catalog.insert(UnitName::new(name), contracts());
    }

    async fn record(&self, name: &str) -> Option<UnitRecord> {
        self.store.get(&UnitName::new(name)).await.unwrap()
    }
}

struct Harness {
    adapters: Adapters,
    engine: Arc<Engine>,
}

impl std::ops::Deref for Harness {
    type Target = Adapters;

    fn deref(&self) -> &Adapters {
        &self.adapters
    }
}

impl Harness {
    fn new(behavior: PollBehavior) -> Self {
        Self::with_store(InMemoryStore::new(), behavior)
    }

    fn with_store(store: InMemoryStore, behavior: PollBehavior) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (event_tx, _) = broadcast::channel(256);
        let adapters = Adapters {
            registry: Arc::new(MemoryRegistry::new()),
            store: Arc::new(store),
            runtime: Arc::new(MemoryRuntime::new()),
            proxy: Arc::new(RecordingProxy::new()),
            client: Arc::new(MemoryVerificationClient::new(behavior)),
            catalog: Arc::new(StaticCatalog::new()),
            migration: Arc::new(CountingMigration::default()),
            shutdown_tx,
            event_tx,
        };
        let engine = Arc::new(adapters.engine_for(VERSION, 1));
        Self { adapters, engine }
    }

    async fn iterate(&self, times: usize) {
        for _ in 0..times {
            self.engine.run_iteration().await.unwrap();
        }
    }
}

fn contracts() -> RequiredContracts {
    [(
        PREDEPLOYED.to_string(),
        ContractMeta {
            name: "EtherbaseUpgradeable".into(),
            solc_long_version: "0.8.11+commit.d7f03943".into(),
            input: serde_json::json!({"language": "Solidity"}),
        },
    )]
    .into_iter()
    .collect()
}

#[tokio::test]
async fn test_provision_new_unit() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");

    let report = h.engine.run_iteration().await.unwrap();
    assert_eq!(report.outcome("alpha").unwrap().action, "provision");
    assert_eq!(report.failed, 0);

    let record = h.record("alpha").await.unwrap();
    assert_eq!(record.version.as_deref(), Some(VERSION));
    assert_eq!(record.rpc_endpoint, "https://alpha.rpc.test");
    assert_eq!(record.ws_endpoint.as_deref(), Some("wss://alpha.rpc.test"));
    assert!(!record.verified);
    assert!(record.upgraded);
    assert_ne!(record.explorer_port, record.db_port);

    let explorer = h.runtime.spec("blockscout_alpha").unwrap();
    assert_eq!(explorer.image, format!("blockscout/blockscout:{}", VERSION));
    assert_eq!(explorer.published_port(), Some(record.explorer_port));
    assert_eq!(
        h.runtime.spec("postgres_alpha").unwrap().published_port(),
        Some(record.db_port)
    );

    assert!(h.proxy.rendered().contains("server_name alpha.*;"));
    assert_eq!(h.proxy.reloads(), 1);
}

#[tokio::test]
async fn test_reconciliation_is_idempotent() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");

    h.iterate(2).await;
    assert!(h.record("alpha").await.unwrap().verified);

    let table = h.store.load().await.unwrap();
    let rendered = h.proxy.rendered();
    let report = h.engine.run_iteration().await.unwrap();

    assert_eq!(report.outcome("alpha").unwrap().action, "noop");
    assert_eq!(h.store.load().await.unwrap(), table);
    assert_eq!(h.proxy.rendered(), rendered);
    assert_eq!(h.runtime.start_count("blockscout_alpha"), 1);
    assert_eq!(h.runtime.start_count("postgres_alpha"), 1);
    assert_eq!(h.client.submissions().len(), 1);
}

#[tokio::test]
async fn test_repair_keeps_ports() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");
    h.iterate(2).await;
    let before = h.record("alpha").await.unwrap();

    h.runtime
        .set_status("blockscout_alpha", ContainerStatus::Exited);
    let report = h.engine.run_iteration().await.unwrap();
    let outcome = report.outcome("alpha").unwrap();
    assert_eq!(outcome.action, "repair");
    assert!(outcome.error.is_none());

    let after = h.record("alpha").await.unwrap();
    assert_eq!(after.explorer_port, before.explorer_port);
    assert_eq!(after.db_port, before.db_port);
    assert!(after.verified);
    assert_eq!(h.runtime.start_count("blockscout_alpha"), 2);
    assert_eq!(h.runtime.start_count("postgres_alpha"), 1);
}

#[tokio::test]
async fn test_stopped_database_is_restarted_not_recreated() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");
    h.iterate(1).await;
    let before = h.record("alpha").await.unwrap();

    h.runtime.set_status("postgres_alpha", ContainerStatus::Exited);
    let report = h.engine.run_iteration().await.unwrap();
    assert_eq!(report.outcome("alpha").unwrap().action, "repair");

    assert_eq!(h.runtime.restart_count("postgres_alpha"), 1);
    assert_eq!(h.runtime.start_count("postgres_alpha"), 1);
    let record = h.record("alpha").await.unwrap();
    assert_eq!(record.db_port, before.db_port);
    // Repair outranks verification of the still unverified unit.
    assert!(!record.verified);
    assert!(h.client.submissions().is_empty());
    assert_eq!(
        h.runtime.status("postgres_alpha").await.unwrap(),
        ContainerStatus::Running
    );
}

#[tokio::test]
async fn test_readiness_gate_wins_over_repair() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");
    h.iterate(1).await;

    h.registry.set_gate("alpha", false);
    h.runtime
        .set_status("blockscout_alpha", ContainerStatus::Exited);
    let report = h.engine.run_iteration().await.unwrap();

    assert_eq!(report.outcome("alpha").unwrap().action, "skip");
    assert_eq!(h.runtime.start_count("blockscout_alpha"), 1);
    assert_eq!(
        h.runtime.status("blockscout_alpha").await.unwrap(),
        ContainerStatus::Exited
    );
}

#[tokio::test]
async fn test_gated_unit_is_provisioned_once_ready() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");
    h.registry.set_gate("alpha", false);
    let mut events = h.event_tx.subscribe();

    h.iterate(2).await;
    assert!(h.record("alpha").await.is_none());
    assert!(h.runtime.container_names().is_empty());

    let mut gated = 0;
    while let Ok(envelope) = events.try_recv() {
        if matches!(envelope.event, AgentEvent::UnitGated { .. }) {
            gated += 1;
        }
    }
    assert_eq!(gated, 2);

    h.registry.set_gate("alpha", true);
    h.iterate(1).await;
    assert!(h.record("alpha").await.is_some());
}

#[tokio::test]
async fn test_two_chains_converge() {
    let h = Harness::new(PollBehavior::PassAfter(2));
    h.add_chain("alpha");
    h.add_chain("beta");

    h.iterate(2).await;

    for name in ["alpha", "beta"] {
        let record = h.record(name).await.unwrap();
        assert!(record.verified, "{} should be verified", name);
        assert_eq!(record.version.as_deref(), Some(VERSION));
    }
    assert_eq!(
        h.runtime.container_names(),
        vec![
            "blockscout_alpha",
            "blockscout_beta",
            "postgres_alpha",
            "postgres_beta"
        ]
    );

    let rendered = h.proxy.rendered();
    assert_eq!(rendered.matches("server_name ").count(), 2);
    assert!(rendered.contains("server_name alpha.*;"));
    assert!(rendered.contains("server_name beta.*;"));

    let report = h.engine.run_iteration().await.unwrap();
    assert!(report.outcomes.iter().all(|o| o.action == "noop"));
}

#[tokio::test]
async fn test_unit_failure_is_isolated() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");
    h.add_chain("beta");
    h.runtime.fail_on("blockscout_alpha");

    let report = h.engine.run_iteration().await.unwrap();
    assert_eq!(report.failed, 1);
    assert!(report.outcome("alpha").unwrap().error.is_some());
    assert!(report.outcome("beta").unwrap().error.is_none());
    assert!(h.record("alpha").await.is_none());
    assert!(h.record("beta").await.is_some());

    h.runtime.clear_failures();
    let report = h.engine.run_iteration().await.unwrap();
    assert_eq!(report.outcome("alpha").unwrap().action, "provision");
    assert_eq!(report.failed, 0);
    assert!(h.record("alpha").await.is_some());
    // The database started by the failed attempt is reused.
    assert_eq!(h.runtime.start_count("postgres_alpha"), 1);
    assert_eq!(h.runtime.start_count("blockscout_alpha"), 1);
}

#[tokio::test]
async fn test_missing_http_endpoint_fails_provision() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");
    h.registry.set_endpoint("alpha", Protocol::Http, None);

    let report = h.engine.run_iteration().await.unwrap();
    let outcome = report.outcome("alpha").unwrap();
    assert_eq!(outcome.action, "provision");
    assert!(outcome.error.as_deref().unwrap().contains("http"));
    assert!(h.runtime.container_names().is_empty());
}

#[tokio::test]
async fn test_websocket_endpoint_is_optional() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");
    h.registry.set_endpoint("alpha", Protocol::Ws, None);

    h.iterate(1).await;
    let record = h.record("alpha").await.unwrap();
    assert!(record.ws_endpoint.is_none());
    let spec = h.runtime.spec("blockscout_alpha").unwrap();
    assert!(!spec.env.contains_key("ETHEREUM_JSONRPC_WS_URL"));
}

#[tokio::test]
async fn test_version_drift_triggers_repair() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");
    h.iterate(2).await;
    let before = h.record("alpha").await.unwrap();

    let upgraded = h.engine_for("7.0.0", 1);
    let report = upgraded.run_iteration().await.unwrap();
    assert_eq!(report.outcome("alpha").unwrap().action, "repair");

    let after = h.record("alpha").await.unwrap();
    assert_eq!(after.version.as_deref(), Some("7.0.0"));
    assert_eq!(after.explorer_port, before.explorer_port);
    assert_eq!(
        h.runtime.spec("blockscout_alpha").unwrap().image,
        "blockscout/blockscout:7.0.0"
    );

    let report = upgraded.run_iteration().await.unwrap();
    assert_eq!(report.outcome("alpha").unwrap().action, "noop");
}

#[tokio::test]
async fn test_migration_runs_once() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");
    // A database left over from an earlier deployment needs migrating.
    h.runtime
        .start(&ExplorerTemplate::default().database(&UnitName::new("alpha"), 45432))
        .await
        .unwrap();

    h.iterate(1).await;
    let record = h.record("alpha").await.unwrap();
    assert!(!record.upgraded);
    assert_eq!(record.db_port, 45432);

    let v7 = h.engine_for("7.0.0", 1);
    v7.run_iteration().await.unwrap();
    assert_eq!(h.migration.runs.load(Ordering::SeqCst), 1);
    assert!(h.record("alpha").await.unwrap().upgraded);

    let v8 = h.engine_for("8.0.0", 1);
    v8.run_iteration().await.unwrap();
    assert_eq!(h.migration.runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.record("alpha").await.unwrap().version.as_deref(),
        Some("8.0.0")
    );
}

#[tokio::test]
async fn test_failed_migration_is_retried_after_repair() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");
    h.runtime
        .start(&ExplorerTemplate::default().database(&UnitName::new("alpha"), 45433))
        .await
        .unwrap();
    h.iterate(1).await;
    h.migration.fails.store(true, Ordering::SeqCst);

    let v7 = h.engine_for("7.0.0", 1);
    let report = v7.run_iteration().await.unwrap();
    assert!(report.outcome("alpha").unwrap().error.is_none());

    let record = h.record("alpha").await.unwrap();
    assert_eq!(record.version.as_deref(), Some("7.0.0"));
    assert!(!record.upgraded);
    assert_eq!(h.migration.runs.load(Ordering::SeqCst), 1);

    // Still failing: reported, and left pending for the next iteration.
    let report = v7.run_iteration().await.unwrap();
    let outcome = report.outcome("alpha").unwrap();
    assert_eq!(outcome.action, "migrate");
    assert!(outcome.error.is_some());
    assert!(!h.record("alpha").await.unwrap().upgraded);

    h.migration.fails.store(false, Ordering::SeqCst);
    let report = v7.run_iteration().await.unwrap();
    assert_eq!(report.outcome("alpha").unwrap().action, "migrate");
    assert!(report.outcome("alpha").unwrap().error.is_none());
    assert!(h.record("alpha").await.unwrap().upgraded);
    assert_eq!(h.migration.runs.load(Ordering::SeqCst), 3);

    let report = v7.run_iteration().await.unwrap();
    assert_eq!(report.outcome("alpha").unwrap().action, "verify");
    assert_eq!(h.migration.runs.load(Ordering::SeqCst), 3);
    assert_eq!(h.runtime.start_count("blockscout_alpha"), 2);
}

#[tokio::test]
async fn test_malformed_record_fails_only_its_unit() {
    let mut table = UnitTable::new();
    table.malformed.insert(
        UnitName::new("beta"),
        MalformedRecord {
            raw: serde_json::json!({"port": "not-a-port"}),
            error: "invalid port".into(),
        },
    );
    let h = Harness::with_store(InMemoryStore::with_table(table), PollBehavior::PassAfter(1));
    h.add_chain("alpha");
    h.add_chain("beta");

    let report = h.engine.run_iteration().await.unwrap();
    assert!(report.outcome("beta").unwrap().error.is_some());
    assert!(report.outcome("alpha").unwrap().error.is_none());
    assert!(h.record("alpha").await.is_some());
    assert!(h.runtime.spec("blockscout_beta").is_none());

    let table = h.store.load().await.unwrap();
    assert!(table.malformed.contains_key(&UnitName::new("beta")));
}

#[tokio::test]
async fn test_verification_polling_is_bounded() {
    let h = Harness::new(PollBehavior::NeverFinish);
    h.add_chain("alpha");
    h.iterate(2).await;

    assert_eq!(h.client.poll_count(), 3);
    assert!(!h.record("alpha").await.unwrap().verified);
}

#[tokio::test]
async fn test_verification_connectivity_errors_are_swallowed() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");
    h.iterate(1).await;

    h.client.set_unreachable(true);
    let report = h.engine.run_iteration().await.unwrap();
    let outcome = report.outcome("alpha").unwrap();
    assert_eq!(outcome.action, "verify");
    assert!(outcome.error.is_none());
    assert!(!h.record("alpha").await.unwrap().verified);

    h.client.set_unreachable(false);
    h.iterate(1).await;
    assert!(h.record("alpha").await.unwrap().verified);
}

#[tokio::test]
async fn test_already_verified_contracts_are_not_resubmitted() {
    let h = Harness::new(PollBehavior::Fail);
    h.add_chain("alpha");
    h.client.mark_verified(&UnitName::new("alpha"), PREDEPLOYED);

    h.iterate(2).await;
    assert!(h.record("alpha").await.unwrap().verified);
    assert!(h.client.submissions().is_empty());
}

#[tokio::test]
async fn test_registry_failure_aborts_iteration() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");
    h.registry.set_listing_fails(true);

    assert!(h.engine.run_iteration().await.is_err());
    assert!(h.runtime.container_names().is_empty());

    h.registry.set_listing_fails(false);
    h.iterate(1).await;
    assert!(h.record("alpha").await.is_some());
}

#[tokio::test]
async fn test_failed_proxy_reload_is_retried() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");
    h.proxy.set_reload_fails(true);

    let report = h.engine.run_iteration().await.unwrap();
    assert!(report.outcome("alpha").unwrap().error.is_some());
    assert!(h.engine.proxy_dirty());
    // The containers are up and recorded, only the route is stale.
    assert!(h.record("alpha").await.is_some());

    h.proxy.set_reload_fails(false);
    h.iterate(1).await;
    assert!(!h.engine.proxy_dirty());
    assert_eq!(h.proxy.reloads(), 1);
    assert!(h.proxy.rendered().contains("server_name alpha.*;"));
}

#[tokio::test]
async fn test_concurrent_units_get_distinct_ports() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    let engine = h.engine_for(VERSION, 4);
    for name in ["alpha", "beta", "gamma", "delta"] {
        h.add_chain(name);
    }

    let report = engine.run_iteration().await.unwrap();
    assert_eq!(report.failed, 0);

    let table = h.store.load().await.unwrap();
    assert_eq!(table.records.len(), 4);
    assert_eq!(table.used_ports().len(), 8);
}

#[tokio::test]
async fn test_scheduler_runs_and_stops_on_shutdown() {
    let h = Harness::new(PollBehavior::PassAfter(1));
    h.add_chain("alpha");
    let mut events = h.event_tx.subscribe();

    let (scheduler, reconcile_rx) = Scheduler::new(h.engine.clone(), Duration::from_secs(3600));
    let handle = tokio::spawn(
        scheduler
            .clone()
            .start(reconcile_rx, h.shutdown_tx.subscribe()),
    );

    wait_for_iteration(&mut events, 1).await;
    assert!(scheduler.trigger_reconcile());
    wait_for_iteration(&mut events, 2).await;
    assert!(scheduler.is_running().await);
    assert!(h.record("alpha").await.unwrap().verified);

    h.shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(!scheduler.is_running().await);
    assert_eq!(h.engine.iterations(), 2);
}

async fn wait_for_iteration(events: &mut broadcast::Receiver<AgentEventEnvelope>, iteration: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(envelope) => {
                    if let AgentEvent::IterationCompleted { iteration: done, .. } = envelope.event {
                        if done >= iteration {
                            return;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    })
    .await
    .unwrap();
}

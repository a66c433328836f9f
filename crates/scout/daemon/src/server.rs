//! Agent setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::AgentConfig;
use crate::engine::{Engine, EngineDeps, EngineSettings, IterationReport};
use crate::error::{DaemonError, DaemonResult};
use crate::migration::{Migration, NoopMigration, RevertReasonMigration};
use crate::scheduler::Scheduler;
use scout_proxy::{NginxConfigurer, NginxOptions, SslPaths};
use scout_registry::{IndexRange, RegistryAddresses, SkaleManagerRegistry, SkaleRegistryConfig};
use scout_runtime::{ContainerRuntime, DockerCli};
use scout_store::{JsonFileStore, MetadataStore};
use scout_types::AgentEventEnvelope;
use scout_verify::{BlockscoutClient, ConfigDirCatalog, VerificationPolicy, Verifier};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};

/// Scout agent: engine, scheduler and optional status API
pub struct Server {
    config: AgentConfig,
    store: Arc<dyn MetadataStore>,
    engine: Arc<Engine>,
    event_tx: broadcast::Sender<AgentEventEnvelope>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Build every adapter from the configuration.
    ///
    /// A missing ABI file or an unreadable state file aborts startup.
    pub async fn new(config: AgentConfig) -> DaemonResult<Self> {
        let addresses = RegistryAddresses::from_abi_file(&config.registry.abi_path)?;
        let registry = Arc::new(SkaleManagerRegistry::new(
            SkaleRegistryConfig {
                eth_endpoint: config.registry.eth_endpoint.clone(),
                proxy_domain: config.registry.proxy_domain.clone(),
                index_range: IndexRange::new(
                    config.registry.first_index,
                    config.registry.last_index,
                ),
                probe_timeout: Duration::from_secs(config.registry.probe_timeout_secs),
            },
            addresses,
        )?);

        let file_store = JsonFileStore::new(&config.store.meta_path);
        file_store.init().await?;
        let store: Arc<dyn MetadataStore> = Arc::new(file_store);
        // Fail fast on an unreadable state file.
        let table = store.load().await?;
        for (name, entry) in &table.malformed {
            tracing::warn!(unit = %name, error = %entry.error, "Malformed record in state file");
        }

        let runtime: Arc<dyn ContainerRuntime> =
            Arc::new(DockerCli::new(config.runtime.docker_binary.clone()));

        let proxy = Arc::new(NginxConfigurer::new(
            &config.proxy.config_path,
            config.proxy.container.clone(),
            NginxOptions {
                upstream_host: config.proxy.upstream_host.clone(),
                ssl: config.proxy.ssl_dir.as_deref().map(SslPaths::from_dir),
            },
            runtime.clone(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let client = Arc::new(BlockscoutClient::new(Duration::from_secs(
            config.verification.request_timeout_secs,
        ))?);
        let verifier = Verifier::new(
            client,
            VerificationPolicy {
                poll_interval: Duration::from_secs(config.verification.poll_interval_secs),
                max_poll_attempts: config.verification.max_poll_attempts,
            },
            shutdown_rx,
        );

        let migration: Arc<dyn Migration> = if config.migration.enabled {
            Arc::new(RevertReasonMigration::new(
                config.migration.db_host.clone(),
                Duration::from_secs(config.scheduler.call_timeout_secs),
            ))
        } else {
            Arc::new(NoopMigration)
        };

        let deps = EngineDeps {
            registry,
            store: store.clone(),
            runtime,
            proxy,
            verifier,
            catalog: Arc::new(ConfigDirCatalog::new(&config.explorer.configs_dir)),
            migration,
            template: config.explorer.template.clone(),
        };

        let settings = EngineSettings {
            target_version: config.explorer.version.clone(),
            explorer_host: config.explorer.host.clone(),
            call_timeout: Duration::from_secs(config.scheduler.call_timeout_secs),
            migration_timeout: Duration::from_secs(config.migration.timeout_secs),
            max_concurrent_units: config.scheduler.max_concurrent_units,
        };

        let (event_tx, _) = broadcast::channel(1000);
        let engine = Arc::new(Engine::new(deps, settings, event_tx.clone()));

        Ok(Self {
            config,
            store,
            engine,
            event_tx,
            shutdown_tx,
        })
    }

    /// Run a single iteration and return its report
    pub async fn run_once(self) -> DaemonResult<IterationReport> {
        let report = self.engine.run_iteration().await?;
        for outcome in &report.outcomes {
            match &outcome.error {
                Some(error) => {
                    tracing::error!(unit = %outcome.unit, action = %outcome.action, %error, "Unit failed")
                }
                None => tracing::info!(unit = %outcome.unit, action = %outcome.action, "Unit done"),
            }
        }
        Ok(report)
    }

    /// Run until SIGINT or SIGTERM
    pub async fn run(self) -> DaemonResult<()> {
        let (scheduler, reconcile_rx) = Scheduler::new(
            self.engine.clone(),
            Duration::from_secs(self.config.scheduler.reconcile_interval_secs),
        );

        let scheduler_handle = tokio::spawn(
            scheduler
                .clone()
                .start(reconcile_rx, self.shutdown_tx.subscribe()),
        );

        if self.config.server.enabled {
            let addr = self.config.server.listen_addr;
            let state = AppState::new(
                self.store.clone(),
                self.engine.clone(),
                scheduler.clone(),
                self.event_tx.clone(),
            );
            let app = create_router(state);
            let listener = TcpListener::bind(addr).await?;

            tracing::info!("Scout status API listening on {}", addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .map_err(|e| DaemonError::Server(e.to_string()))?;
        } else {
            shutdown_signal().await;
        }

        tracing::info!("Scout agent shutting down");

        // Cancels the wait between iterations and any verification polling.
        let _ = self.shutdown_tx.send(true);
        scheduler.stop().await;
        if let Err(e) = scheduler_handle.await {
            tracing::error!(error = %e, "Scheduler task ended abnormally");
        }

        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

//! Scout Daemon - Explorer fleet reconciliation agent
//!
//! The daemon keeps one block explorer running for every chain in the
//! registry:
//! - Provisions explorer and database containers for new chains
//! - Repairs unhealthy or outdated explorers
//! - Verifies predeployed contracts
//! - Keeps the reverse-proxy routes in sync

use clap::Parser;
use scout_daemon::error::{DaemonError, DaemonResult};
use scout_daemon::{AgentConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Scout Daemon CLI
#[derive(Parser)]
#[command(name = "scoutd")]
#[command(about = "Scout - Explorer fleet reconciliation agent", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SCOUT_CONFIG")]
    config: Option<String>,

    /// Status API listen address
    #[arg(short, long, env = "SCOUT_LISTEN_ADDR")]
    listen: Option<String>,

    /// Registry JSON-RPC endpoint
    #[arg(long, env = "ETH_ENDPOINT")]
    eth_endpoint: Option<String>,

    /// Domain of the chain RPC proxy
    #[arg(long, env = "PROXY_DOMAIN")]
    proxy_domain: Option<String>,

    /// First chain index to handle
    #[arg(long, env = "FIRST_SCHAIN_ID")]
    first_index: Option<usize>,

    /// Chain index to stop before
    #[arg(long, env = "LAST_SCHAIN_ID")]
    last_index: Option<usize>,

    /// Explorer version to run
    #[arg(long, env = "EXPLORER_VERSION")]
    explorer_version: Option<String>,

    /// Run a single iteration and exit
    #[arg(long)]
    once: bool,

    /// Log level (defaults to `logging.level`)
    #[arg(long, env = "SCOUT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "SCOUT_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = AgentConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Initialize tracing
    let logging = config.logging.with_overrides(cli.log_level.clone(), cli.json);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.clone().into());

    if logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Override with CLI args and legacy environment
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(endpoint) = cli.eth_endpoint {
        config.registry.eth_endpoint = endpoint;
    }
    if let Some(domain) = cli.proxy_domain {
        config.registry.proxy_domain = Some(domain);
    }
    if cli.first_index.is_some() {
        config.registry.first_index = cli.first_index;
    }
    if cli.last_index.is_some() {
        config.registry.last_index = cli.last_index;
    }
    if let Some(version) = cli.explorer_version {
        config.explorer.version = version;
    }

    config.validate().map_err(DaemonError::Config)?;

    // Print startup banner
    println!(
        r#"
  ____   ____ ___  _   _ _____
 / ___| / ___/ _ \| | | |_   _|
 \___ \| |  | | | | | | | | |
  ___) | |__| |_| | |_| | | |
 |____/ \____\___/ \___/  |_|

  Explorer fleet reconciliation agent
  Version: {}
  Explorer: {}
  Interval: {}s
"#,
        env!("CARGO_PKG_VERSION"),
        config.explorer.version,
        config.scheduler.reconcile_interval_secs
    );

    let server = Server::new(config).await?;
    if cli.once {
        let report = server.run_once().await?;
        tracing::info!(
            iteration = report.iteration,
            units = report.outcomes.len(),
            failed = report.failed,
            "Single iteration finished"
        );
        return Ok(());
    }
    server.run().await
}

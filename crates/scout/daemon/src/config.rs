//! Configuration for scout-daemon

use scout_runtime::ExplorerTemplate;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Main agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Registry connection
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Explorer provisioning
    #[serde(default)]
    pub explorer: ExplorerConfig,

    /// Metadata store
    #[serde(default)]
    pub store: StoreConfig,

    /// Reverse proxy
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Container runtime
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Contract verification
    #[serde(default)]
    pub verification: VerificationConfig,

    /// One-time data migration
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Status API server
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// JSON-RPC endpoint of the chain hosting the manager contracts
    #[serde(default)]
    pub eth_endpoint: String,

    /// Manager ABI file holding the contract addresses
    #[serde(default = "default_abi_path")]
    pub abi_path: PathBuf,

    /// Public proxy domain tried before node endpoints
    #[serde(default)]
    pub proxy_domain: Option<String>,

    /// First index of the chain list handled by this agent
    #[serde(default)]
    pub first_index: Option<usize>,

    /// End (exclusive) of the chain list handled by this agent
    #[serde(default)]
    pub last_index: Option<usize>,

    /// Endpoint liveness probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            eth_endpoint: String::new(),
            abi_path: default_abi_path(),
            proxy_domain: None,
            first_index: None,
            last_index: None,
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

/// Explorer provisioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Target explorer version; recorded versions that differ are repaired
    #[serde(default)]
    pub version: String,

    /// Host the agent reaches explorer ports on
    #[serde(default = "default_local_host")]
    pub host: String,

    /// Directory of per-chain config files with the contracts to verify
    #[serde(default = "default_configs_dir")]
    pub configs_dir: PathBuf,

    /// Container templates
    #[serde(default)]
    pub template: ExplorerTemplate,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            version: String::new(),
            host: default_local_host(),
            configs_dir: default_configs_dir(),
            template: ExplorerTemplate::default(),
        }
    }
}

/// Metadata store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON state file
    #[serde(default = "default_meta_path")]
    pub meta_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            meta_path: default_meta_path(),
        }
    }
}

/// Reverse proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Rendered nginx config file
    #[serde(default = "default_nginx_path")]
    pub config_path: PathBuf,

    /// Proxy container restarted after every change
    #[serde(default = "default_proxy_container")]
    pub container: String,

    /// Host the proxy reaches explorer ports on
    #[serde(default = "default_local_host")]
    pub upstream_host: String,

    /// Directory holding `server.crt` and `server.key`; enables TLS routes
    #[serde(default)]
    pub ssl_dir: Option<PathBuf>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            config_path: default_nginx_path(),
            container: default_proxy_container(),
            upstream_host: default_local_host(),
            ssl_dir: None,
        }
    }
}

/// Container runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Docker CLI binary
    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_binary: default_docker_binary(),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Reconciliation interval in seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Timeout of every registry, store, runtime and proxy call in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Units reconciled concurrently
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_units: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval(),
            call_timeout_secs: default_call_timeout(),
            max_concurrent_units: default_max_concurrent(),
        }
    }
}

/// Verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Delay between status polls in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Polls per submission before giving up
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Explorer API request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_poll_attempts: default_max_poll_attempts(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Migration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Run the revert-reason backfill; when off, units are marked upgraded
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Host the explorer databases are published on
    #[serde(default = "default_local_host")]
    pub db_host: String,

    /// Whole-migration timeout in seconds
    #[serde(default = "default_migration_timeout")]
    pub timeout_secs: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_host: default_local_host(),
            timeout_secs: default_migration_timeout(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Serve the status API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: default_listen_addr(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Command-line settings take precedence over the configured ones
    pub fn with_overrides(&self, level: Option<String>, json: bool) -> Self {
        Self {
            level: level.unwrap_or_else(|| self.level.clone()),
            json: json || self.json,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_abi_path() -> PathBuf {
    PathBuf::from("data/abi.json")
}

fn default_configs_dir() -> PathBuf {
    PathBuf::from("data/configs")
}

fn default_meta_path() -> PathBuf {
    PathBuf::from("data/meta.json")
}

fn default_nginx_path() -> PathBuf {
    PathBuf::from("data/nginx.conf")
}

fn default_proxy_container() -> String {
    "nginx".to_string()
}

fn default_local_host() -> String {
    "127.0.0.1".to_string()
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_reconcile_interval() -> u64 {
    600
}

fn default_call_timeout() -> u64 {
    120
}

fn default_max_concurrent() -> usize {
    1
}

fn default_poll_interval() -> u64 {
    10
}

fn default_max_poll_attempts() -> u32 {
    30
}

fn default_request_timeout() -> u64 {
    30
}

fn default_migration_timeout() -> u64 {
    1800
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8090))
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AgentConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `SCOUT_`-prefixed environment variables (`__` between sections).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&AgentConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SCOUT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Check settings that would make the agent misbehave
    pub fn validate(&self) -> Result<(), String> {
        if self.registry.eth_endpoint.trim().is_empty() {
            return Err("registry endpoint is not set (ETH_ENDPOINT)".into());
        }
        if self.explorer.version.trim().is_empty() {
            return Err("explorer version is not set (EXPLORER_VERSION)".into());
        }
        if self.scheduler.reconcile_interval_secs == 0 {
            return Err("scheduler.reconcile_interval_secs must be positive".into());
        }
        if self.scheduler.call_timeout_secs == 0 {
            return Err("scheduler.call_timeout_secs must be positive".into());
        }
        if self.scheduler.max_concurrent_units == 0 {
            return Err("scheduler.max_concurrent_units must be at least 1".into());
        }
        if self.verification.max_poll_attempts == 0 {
            return Err("verification.max_poll_attempts must be at least 1".into());
        }
        if let (Some(first), Some(last)) = (self.registry.first_index, self.registry.last_index) {
            if first > last {
                return Err(format!(
                    "first chain index {} is after last chain index {}",
                    first, last
                ));
            }
        }
        Ok(())
    }
}

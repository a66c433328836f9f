//! Launch specs for the explorer and its database

use scout_types::{LaunchSpec, UnitName};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Port the explorer listens on inside its container
pub const EXPLORER_CONTAINER_PORT: u16 = 4000;

/// Port postgres listens on inside its container
pub const DATABASE_CONTAINER_PORT: u16 = 5432;

/// Name of the explorer database
pub const DATABASE_NAME: &str = "explorer";

const HOST_GATEWAY: &str = "host.docker.internal";

/// Settings shared by every unit's containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerTemplate {
    /// Explorer image without tag; the unit's version is the tag
    pub explorer_image: String,

    /// Database image including tag
    pub database_image: String,

    /// Host directory holding per-unit database data
    pub data_dir: PathBuf,

    /// Docker network to attach both containers to
    pub network: Option<String>,

    /// Restart policy for both containers
    pub restart_policy: Option<String>,
}

impl Default for ExplorerTemplate {
    fn default() -> Self {
        Self {
            explorer_image: "blockscout/blockscout".to_string(),
            database_image: "postgres:14".to_string(),
            data_dir: PathBuf::from("data/explorers"),
            network: None,
            restart_policy: Some("unless-stopped".to_string()),
        }
    }
}

/// Per-unit inputs of the explorer launch spec
#[derive(Debug, Clone)]
pub struct ExplorerParams<'a> {
    pub name: &'a UnitName,
    pub version: &'a str,
    pub explorer_port: u16,
    pub db_port: u16,
    pub rpc_endpoint: &'a str,
    pub ws_endpoint: Option<&'a str>,
}

impl ExplorerTemplate {
    /// Connection string the explorer uses to reach its database
    pub fn database_url(&self, db_port: u16) -> String {
        format!(
            "postgresql://postgres:@{}:{}/{}",
            HOST_GATEWAY, db_port, DATABASE_NAME
        )
    }

    pub fn explorer(&self, params: &ExplorerParams<'_>) -> LaunchSpec {
        let mut spec = LaunchSpec::new(
            params.name.explorer_container(),
            format!("{}:{}", self.explorer_image, params.version),
        )
        .with_port(params.explorer_port, EXPLORER_CONTAINER_PORT)
        .with_env("PORT", EXPLORER_CONTAINER_PORT.to_string())
        .with_env("SUBNETWORK", params.name.as_str())
        .with_env("NETWORK_PATH", format!("/{}", params.name))
        .with_env("ETHEREUM_JSONRPC_VARIANT", "geth")
        .with_env("ETHEREUM_JSONRPC_HTTP_URL", params.rpc_endpoint)
        .with_env("ETHEREUM_JSONRPC_TRACE_URL", params.rpc_endpoint)
        .with_env("DATABASE_URL", self.database_url(params.db_port))
        .with_env("ECTO_USE_SSL", "false")
        .with_extra_host(format!("{}:host-gateway", HOST_GATEWAY))
        .with_command(["/bin/sh", "-c", "bin/blockscout eval \"Elixir.Explorer.ReleaseTasks.create_and_migrate()\" && bin/blockscout start"]);

        if let Some(ws) = params.ws_endpoint {
            spec = spec.with_env("ETHEREUM_JSONRPC_WS_URL", ws);
        }
        self.apply_common(spec)
    }

    pub fn database(&self, name: &UnitName, db_port: u16) -> LaunchSpec {
        let spec = LaunchSpec::new(name.database_container(), self.database_image.clone())
            .with_port(db_port, DATABASE_CONTAINER_PORT)
            .with_env("POSTGRES_DB", DATABASE_NAME)
            .with_env("POSTGRES_USER", "postgres")
            .with_env("POSTGRES_HOST_AUTH_METHOD", "trust")
            .with_volume(
                self.data_dir.join(name.as_str()).join("postgres"),
                "/var/lib/postgresql/data",
            );
        self.apply_common(spec)
    }

    fn apply_common(&self, mut spec: LaunchSpec) -> LaunchSpec {
        spec.network = self.network.clone();
        if let Some(policy) = &self.restart_policy {
            spec = spec.with_restart_policy(policy.clone());
        }
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explorer_spec() {
        let template = ExplorerTemplate::default();
        let name = UnitName::new("alpha");
        let spec = template.explorer(&ExplorerParams {
            name: &name,
            version: "7.0.0",
            explorer_port: 49160,
            db_port: 49161,
            rpc_endpoint: "https://node:10008",
            ws_endpoint: Some("ws://node:10002"),
        });

        assert_eq!(spec.name, "blockscout_alpha");
        assert_eq!(spec.image, "blockscout/blockscout:7.0.0");
        assert_eq!(spec.published_port(), Some(49160));
        assert_eq!(
            spec.env["DATABASE_URL"],
            "postgresql://postgres:@host.docker.internal:49161/explorer"
        );
        assert_eq!(spec.env["ETHEREUM_JSONRPC_WS_URL"], "ws://node:10002");
        assert_eq!(spec.restart_policy.as_deref(), Some("unless-stopped"));
    }

    #[test]
    fn test_database_spec() {
        let template = ExplorerTemplate {
            data_dir: PathBuf::from("/srv/scout"),
            network: Some("scout".into()),
            ..Default::default()
        };
        let spec = template.database(&UnitName::new("beta"), 5500);

        assert_eq!(spec.name, "postgres_beta");
        assert_eq!(spec.ports[0].container, DATABASE_CONTAINER_PORT);
        assert_eq!(spec.volumes[0].host, PathBuf::from("/srv/scout/beta/postgres"));
        assert_eq!(spec.network.as_deref(), Some("scout"));
    }
}

//! Container status and launch descriptions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Observed state of a named container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    Running,
    Exited,
    Created,
    NotFound,
    /// Any other runtime state (restarting, paused, dead, ...)
    Other(String),
}

impl ContainerStatus {
    /// Parse a docker `State.Status` string
    pub fn from_docker(status: &str) -> Self {
        match status.trim() {
            "running" => ContainerStatus::Running,
            "exited" => ContainerStatus::Exited,
            "created" => ContainerStatus::Created,
            other => ContainerStatus::Other(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }

    pub fn exists(&self) -> bool {
        !matches!(self, ContainerStatus::NotFound)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerStatus::Running => f.write_str("running"),
            ContainerStatus::Exited => f.write_str("exited"),
            ContainerStatus::Created => f.write_str("created"),
            ContainerStatus::NotFound => f.write_str("not_found"),
            ContainerStatus::Other(status) => f.write_str(status),
        }
    }
}

/// Host port published for a container port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
}

/// Bind mount of a host directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub host: PathBuf,
    pub container: String,
}

/// Everything a runtime needs to start one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Container name, also the lookup key for status calls
    pub name: String,

    /// Image reference including tag
    pub image: String,

    /// Environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Published ports
    #[serde(default)]
    pub ports: Vec<PortBinding>,

    /// Bind mounts
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,

    /// Extra `/etc/hosts` entries, `host:ip`
    #[serde(default)]
    pub extra_hosts: Vec<String>,

    /// Container network
    #[serde(default)]
    pub network: Option<String>,

    /// Restart policy passed to the runtime
    #[serde(default)]
    pub restart_policy: Option<String>,

    /// Command override
    #[serde(default)]
    pub command: Vec<String>,
}

impl LaunchSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env: BTreeMap::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            extra_hosts: Vec::new(),
            network: None,
            restart_policy: None,
            command: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_port(mut self, host: u16, container: u16) -> Self {
        self.ports.push(PortBinding { host, container });
        self
    }

    pub fn with_volume(mut self, host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        self.volumes.push(VolumeMount {
            host: host.into(),
            container: container.into(),
        });
        self
    }

    pub fn with_extra_host(mut self, entry: impl Into<String>) -> Self {
        self.extra_hosts.push(entry.into());
        self
    }

    pub fn with_restart_policy(mut self, policy: impl Into<String>) -> Self {
        self.restart_policy = Some(policy.into());
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// First published host port
    pub fn published_port(&self) -> Option<u16> {
        self.ports.first().map(|p| p.host)
    }
}

//! Docker CLI backend

use crate::error::{Result, RuntimeError};
use crate::traits::ContainerRuntime;
use async_trait::async_trait;
use scout_types::{ContainerStatus, LaunchSpec};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;

/// Runtime driving the local docker daemon through the `docker` binary
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run a docker subcommand and return its trimmed stdout
    async fn exec(&self, args: &[String]) -> Result<String> {
        tracing::trace!(binary = %self.binary, ?args, "Running docker command");
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let command = args.first().cloned().unwrap_or_default();
            if is_missing_container(&stderr) {
                return Err(RuntimeError::NotFound(
                    args.last().cloned().unwrap_or_default(),
                ));
            }
            if stderr.contains("is already in use") {
                return Err(RuntimeError::AlreadyExists(spec_name(args)));
            }
            return Err(RuntimeError::CommandFailed { command, stderr });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn is_missing_container(stderr: &str) -> bool {
    stderr.contains("No such container") || stderr.contains("No such object")
}

fn spec_name(args: &[String]) -> String {
    args.iter()
        .position(|a| a == "--name")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .unwrap_or_default()
}

/// Arguments of `docker run` for `spec`
pub fn run_args(spec: &LaunchSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];
    if let Some(policy) = &spec.restart_policy {
        args.push("--restart".into());
        args.push(policy.clone());
    }
    if let Some(network) = &spec.network {
        args.push("--network".into());
        args.push(network.clone());
    }
    for port in &spec.ports {
        args.push("-p".into());
        args.push(format!("{}:{}", port.host, port.container));
    }
    for (key, value) in &spec.env {
        args.push("-e".into());
        args.push(format!("{}={}", key, value));
    }
    for volume in &spec.volumes {
        args.push("-v".into());
        args.push(format!("{}:{}", volume.host.display(), volume.container));
    }
    for host in &spec.extra_hosts {
        args.push("--add-host".into());
        args.push(host.clone());
    }
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

#[derive(Deserialize)]
struct HostBinding {
    #[serde(rename = "HostPort")]
    host_port: String,
}

/// Extract the first host port from `NetworkSettings.Ports` json
pub fn parse_published_port(json: &str) -> Result<Option<u16>> {
    let json = json.trim();
    if json.is_empty() || json == "null" {
        return Ok(None);
    }
    let ports: BTreeMap<String, Option<Vec<HostBinding>>> =
        serde_json::from_str(json).map_err(|e| RuntimeError::Parse(e.to_string()))?;

    ports
        .values()
        .flatten()
        .flatten()
        .map(|b| b.host_port.trim())
        .find(|p| !p.is_empty())
        .map(|p| {
            p.parse::<u16>()
                .map_err(|_| RuntimeError::Parse(format!("invalid host port {:?}", p)))
        })
        .transpose()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn status(&self, name: &str) -> Result<ContainerStatus> {
        let args = [
            "inspect".to_string(),
            "--format".to_string(),
            "{{.State.Status}}".to_string(),
            name.to_string(),
        ];
        match self.exec(&args).await {
            Ok(status) => Ok(ContainerStatus::from_docker(&status)),
            Err(RuntimeError::NotFound(_)) => Ok(ContainerStatus::NotFound),
            Err(e) => Err(e),
        }
    }

    async fn start(&self, spec: &LaunchSpec) -> Result<()> {
        tracing::info!(container = %spec.name, image = %spec.image, "Starting container");
        let id = self.exec(&run_args(spec)).await?;
        tracing::debug!(container = %spec.name, %id, "Container started");
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<()> {
        tracing::info!(container = %name, "Restarting container");
        self.exec(&["restart".to_string(), name.to_string()])
            .await
            .map(|_| ())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        tracing::info!(container = %name, "Removing container");
        match self
            .exec(&["rm".to_string(), "-f".to_string(), name.to_string()])
            .await
        {
            Ok(_) | Err(RuntimeError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn published_port(&self, name: &str) -> Result<Option<u16>> {
        let args = [
            "inspect".to_string(),
            "--format".to_string(),
            "{{json .NetworkSettings.Ports}}".to_string(),
            name.to_string(),
        ];
        match self.exec(&args).await {
            Ok(json) => parse_published_port(&json),
            Err(RuntimeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

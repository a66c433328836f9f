//! In-memory runtime for development and testing

use crate::error::{Result, RuntimeError};
use crate::traits::ContainerRuntime;
use async_trait::async_trait;
use dashmap::DashMap;
use scout_types::{ContainerStatus, LaunchSpec};
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct Container {
    spec: LaunchSpec,
    status: ContainerStatus,
}

/// Runtime that only tracks container state
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    containers: DashMap<String, Container>,
    starts: DashMap<String, usize>,
    restarts: DashMap<String, usize>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the status of an existing container
    pub fn set_status(&self, name: &str, status: ContainerStatus) {
        if let Some(mut container) = self.containers.get_mut(name) {
            container.status = status;
        }
    }

    /// Make every operation on `name` fail
    pub fn fail_on(&self, name: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(name.to_string());
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.clear();
        }
    }

    /// Launch spec a container was started with
    pub fn spec(&self, name: &str) -> Option<LaunchSpec> {
        self.containers.get(name).map(|c| c.spec.clone())
    }

    /// Number of times `name` was started
    pub fn start_count(&self, name: &str) -> usize {
        self.starts.get(name).map(|c| *c).unwrap_or(0)
    }

    /// Number of times `name` was restarted
    pub fn restart_count(&self, name: &str) -> usize {
        self.restarts.get(name).map(|c| *c).unwrap_or(0)
    }

    /// Names of every known container, sorted
    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.containers.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }

    fn check(&self, name: &str) -> Result<()> {
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(name))
            .unwrap_or(false);
        if failing {
            return Err(RuntimeError::CommandFailed {
                command: "memory".into(),
                stderr: format!("injected failure for {}", name),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
    async fn status(&self, name: &str) -> Result<ContainerStatus> {
        self.check(name)?;
        Ok(self
            .containers
            .get(name)
            .map(|c| c.status.clone())
            .unwrap_or(ContainerStatus::NotFound))
    }

    async fn start(&self, spec: &LaunchSpec) -> Result<()> {
        self.check(&spec.name)?;
        if self.containers.contains_key(&spec.name) {
            return Err(RuntimeError::AlreadyExists(spec.name.clone()));
        }
        self.containers.insert(
            spec.name.clone(),
            Container {
                spec: spec.clone(),
                status: ContainerStatus::Running,
            },
        );
        *self.starts.entry(spec.name.clone()).or_insert(0) += 1;
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<()> {
        self.check(name)?;
        let mut container = self
            .containers
            .get_mut(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        container.status = ContainerStatus::Running;
        *self.restarts.entry(name.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.check(name)?;
        self.containers.remove(name);
        Ok(())
    }

    async fn published_port(&self, name: &str) -> Result<Option<u16>> {
        self.check(name)?;
        Ok(self
            .containers
            .get(name)
            .and_then(|c| c.spec.published_port()))
    }
}

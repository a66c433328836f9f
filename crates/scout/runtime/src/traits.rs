//! Container runtime trait definition

use crate::error::Result;
use async_trait::async_trait;
use scout_types::{ContainerStatus, LaunchSpec};

/// Lifecycle operations on named containers
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Current status; a missing container is [`ContainerStatus::NotFound`]
    async fn status(&self, name: &str) -> Result<ContainerStatus>;

    /// Create and start a container. Fails if the name is taken.
    async fn start(&self, spec: &LaunchSpec) -> Result<()>;

    /// Restart an existing container
    async fn restart(&self, name: &str) -> Result<()>;

    /// Stop and remove a container. Removing a missing container succeeds.
    async fn remove(&self, name: &str) -> Result<()>;

    /// First host port published by the container, if any
    async fn published_port(&self, name: &str) -> Result<Option<u16>>;
}

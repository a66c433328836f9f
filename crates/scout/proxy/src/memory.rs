//! Recording proxy for development and testing

use crate::error::{ProxyError, Result};
use crate::nginx::{render, NginxOptions};
use crate::traits::ProxyConfigurer;
use async_trait::async_trait;
use scout_types::{UnitName, UnitRecord};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

/// Keeps the last rendered configuration in memory
#[derive(Debug, Default)]
pub struct RecordingProxy {
    options: NginxOptions,
    rendered: RwLock<String>,
    regenerations: AtomicUsize,
    reloads: AtomicUsize,
    reload_fails: AtomicBool,
}

impl RecordingProxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last rendered configuration
    pub fn rendered(&self) -> String {
        self.rendered
            .read()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn regenerations(&self) -> usize {
        self.regenerations.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    /// Make `reload` fail as if the proxy container were gone
    pub fn set_reload_fails(&self, fails: bool) {
        self.reload_fails.store(fails, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProxyConfigurer for RecordingProxy {
    async fn regenerate(&self, records: &BTreeMap<UnitName, UnitRecord>) -> Result<()> {
        let rendered = render(records, &self.options);
        if let Ok(mut current) = self.rendered.write() {
            *current = rendered;
        }
        self.regenerations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        if self.reload_fails.load(Ordering::SeqCst) {
            return Err(ProxyError::Task("proxy container unavailable".into()));
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//! nginx configuration rendering

use crate::error::{ProxyError, Result};
use crate::traits::ProxyConfigurer;
use async_trait::async_trait;
use scout_runtime::ContainerRuntime;
use scout_types::{UnitName, UnitRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const INDENT: &str = "    ";

/// One nginx directive, optionally with a nested block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub args: Vec<String>,
    pub block: Option<Vec<Directive>>,
}

impl Directive {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
            block: None,
        }
    }

    pub fn block<I, S>(name: impl Into<String>, args: I, children: Vec<Directive>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            block: Some(children),
            ..Self::new(name, args)
        }
    }

    fn write_to(&self, out: &mut String, depth: usize) {
        let indent = INDENT.repeat(depth);
        out.push_str(&indent);
        out.push_str(&self.name);
        for arg in &self.args {
            out.push(' ');
            out.push_str(&quote(arg));
        }
        match &self.block {
            None => out.push_str(";\n"),
            Some(children) => {
                out.push_str(" {\n");
                for child in children {
                    child.write_to(out, depth + 1);
                }
                let _ = writeln!(out, "{}}}", indent);
            }
        }
    }
}

fn quote(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ';' | '{' | '}' | '"' | '\'' | '#'));
    if needs_quotes {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

/// Certificate and key used by the TLS route blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslPaths {
    pub certificate: PathBuf,
    pub certificate_key: PathBuf,
}

impl SslPaths {
    /// `server.crt` and `server.key` inside `dir`
    pub fn from_dir(dir: &Path) -> Self {
        Self {
            certificate: dir.join("server.crt"),
            certificate_key: dir.join("server.key"),
        }
    }
}

/// Rendering options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NginxOptions {
    /// Host the proxy reaches explorer ports on
    pub upstream_host: String,

    /// Emit an additional TLS block per unit
    pub ssl: Option<SslPaths>,
}

impl Default for NginxOptions {
    fn default() -> Self {
        Self {
            upstream_host: "127.0.0.1".to_string(),
            ssl: None,
        }
    }
}

fn route_block(name: &UnitName, upstream: &str, ssl: Option<&SslPaths>) -> Directive {
    let mut children = Vec::new();
    if let Some(ssl) = ssl {
        children.push(Directive::new("listen", ["443", "ssl"]));
        children.push(Directive::new(
            "ssl_certificate",
            [ssl.certificate.display().to_string()],
        ));
        children.push(Directive::new(
            "ssl_certificate_key",
            [ssl.certificate_key.display().to_string()],
        ));
        children.push(Directive::new("ssl_verify_client", ["off"]));
    }
    children.push(Directive::new("server_name", [format!("{}.*", name)]));
    children.push(Directive::block(
        "location",
        ["/socket"],
        vec![
            Directive::new("proxy_http_version", ["1.1"]),
            Directive::new("proxy_set_header", ["Upgrade", "$http_upgrade"]),
            Directive::new("proxy_set_header", ["Connection", "upgrade"]),
            Directive::new("proxy_pass", [upstream]),
        ],
    ));
    children.push(Directive::block(
        "location",
        ["/"],
        vec![Directive::new("proxy_pass", [upstream])],
    ));
    Directive::block("server", Vec::<String>::new(), children)
}

/// Render the full configuration for `records`, ordered by unit name
pub fn render(records: &BTreeMap<UnitName, UnitRecord>, options: &NginxOptions) -> String {
    let mut out = String::new();
    for (name, record) in records {
        let upstream = record.explorer_url(&options.upstream_host);
        route_block(name, &upstream, None).write_to(&mut out, 0);
        if let Some(ssl) = &options.ssl {
            route_block(name, &upstream, Some(ssl)).write_to(&mut out, 0);
        }
    }
    out
}

/// Writes the nginx config file and restarts the proxy container
pub struct NginxConfigurer {
    path: PathBuf,
    container: String,
    options: NginxOptions,
    runtime: Arc<dyn ContainerRuntime>,
}

impl NginxConfigurer {
    pub fn new(
        path: impl Into<PathBuf>,
        container: impl Into<String>,
        options: NginxOptions,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            path: path.into(),
            container: container.into(),
            options,
            runtime,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl ProxyConfigurer for NginxConfigurer {
    async fn regenerate(&self, records: &BTreeMap<UnitName, UnitRecord>) -> Result<()> {
        let rendered = render(records, &self.options);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &rendered))
            .await
            .map_err(|e| ProxyError::Task(e.to_string()))??;

        tracing::info!(
            path = %self.path.display(),
            routes = records.len(),
            "Proxy config regenerated"
        );
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        tracing::info!(container = %self.container, "Reloading proxy");
        self.runtime.restart(&self.container).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_runtime::MemoryRuntime;
    use scout_types::{LaunchSpec, UnitPatch};

    fn records(entries: &[(&str, u16)]) -> BTreeMap<UnitName, UnitRecord> {
        entries
            .iter()
            .map(|(name, port)| {
                let record = UnitPatch::new()
                    .explorer_port(*port)
                    .db_port(port + 1)
                    .rpc_endpoint("http://rpc")
                    .into_record()
                    .unwrap();
                (UnitName::new(*name), record)
            })
            .collect()
    }

    #[test]
    fn test_render_route_block() {
        let rendered = render(&records(&[("alpha", 4100)]), &NginxOptions::default());
        let expected = "\
server {
    server_name alpha.*;
    location /socket {
        proxy_http_version 1.1;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection upgrade;
        proxy_pass http://127.0.0.1:4100;
    }
    location / {
        proxy_pass http://127.0.0.1:4100;
    }
}
";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_render_is_deterministic_and_ordered() {
        let a = render(&records(&[("beta", 2), ("alpha", 1)]), &NginxOptions::default());
        let b = render(&records(&[("alpha", 1), ("beta", 2)]), &NginxOptions::default());
        assert_eq!(a, b);
        assert!(a.find("alpha.*").unwrap() < a.find("beta.*").unwrap());
        assert_eq!(render(&BTreeMap::new(), &NginxOptions::default()), "");
    }

    #[test]
    fn test_render_with_ssl() {
        let options = NginxOptions {
            ssl: Some(SslPaths::from_dir(Path::new("/certs"))),
            ..Default::default()
        };
        let rendered = render(&records(&[("alpha", 4100)]), &options);
        assert_eq!(rendered.matches("server_name alpha.*;").count(), 2);
        assert!(rendered.contains("    listen 443 ssl;\n"));
        assert!(rendered.contains("ssl_certificate /certs/server.crt;"));
        assert!(rendered.contains("ssl_certificate_key /certs/server.key;"));
        assert!(rendered.contains("ssl_verify_client off;"));
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("two words"), "\"two words\"");
        assert_eq!(quote(""), "\"\"");
    }

    #[tokio::test]
    async fn test_configurer_writes_and_reloads() {
        let dir = tempfile::TempDir::new().unwrap();
        let runtime = Arc::new(MemoryRuntime::new());
        runtime
            .start(&LaunchSpec::new("nginx", "nginx:1"))
            .await
            .unwrap();

        let configurer = NginxConfigurer::new(
            dir.path().join("conf").join("nginx.conf"),
            "nginx",
            NginxOptions::default(),
            runtime.clone(),
        );
        configurer
            .regenerate(&records(&[("alpha", 4100)]))
            .await
            .unwrap();
        configurer.reload().await.unwrap();

        let written = std::fs::read_to_string(configurer.path()).unwrap();
        assert!(written.contains("server_name alpha.*;"));
        assert_eq!(runtime.restart_count("nginx"), 1);
    }

    #[tokio::test]
    async fn test_reload_without_proxy_container_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let configurer = NginxConfigurer::new(
            dir.path().join("nginx.conf"),
            "nginx",
            NginxOptions::default(),
            Arc::new(MemoryRuntime::new()),
        );
        assert!(matches!(
            configurer.reload().await,
            Err(ProxyError::Reload(_))
        ));
    }
}

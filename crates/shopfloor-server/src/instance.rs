//! One running tool server: a domain registry bound to a transport.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopfloor_core::{Error, Result, ServerDomain};
use shopfloor_store::DataStore;
use shopfloor_tools::{Envelope, ToolRegistry, primary_document, registry};

use crate::request::ToolCall;

/// Which channel a server answers on. The two are mutually exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// HTTP on a fixed port.
    Http,
    /// Newline-delimited frames on stdin/stdout.
    Stdio,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Stdio => write!(f, "stdio"),
        }
    }
}

/// Health as reported by `GET /health`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// `"healthy"` or `"degraded"`.
    pub status: String,
    /// Seconds since the instance was created.
    pub uptime_seconds: u64,
    /// Domain served.
    pub domain: ServerDomain,
    /// Process id of the server.
    pub pid: u32,
}

impl Health {
    /// Status string of a server whose primary document loads.
    pub const HEALTHY: &'static str = "healthy";
    /// Status string of a server whose primary document does not load.
    pub const DEGRADED: &'static str = "degraded";

    /// Whether the server reported itself healthy.
    pub fn is_healthy(&self) -> bool {
        self.status == Self::HEALTHY
    }
}

/// Metadata as reported by `GET /info`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerInfo {
    pub domain: ServerDomain,
    pub name: String,
    pub description: String,
    pub version: String,
    pub port: u16,
    pub transport: TransportMode,
    pub started_at: DateTime<Utc>,
    pub tools: Vec<String>,
}

/// A domain registry bound to one port and one transport.
pub struct ServerInstance {
    registry: ToolRegistry,
    port: u16,
    transport: TransportMode,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl ServerInstance {
    /// Build the registry for `domain` over `store`.
    ///
    /// # Errors
    ///
    /// Fails if the domain's tool table cannot be registered.
    pub fn new(
        domain: ServerDomain,
        store: Arc<DataStore>,
        port: u16,
        transport: TransportMode,
    ) -> Result<Self> {
        let registry = registry(domain, store)?;
        Ok(Self {
            registry,
            port,
            transport,
            started_at: Utc::now(),
            started: Instant::now(),
        })
    }

    pub fn domain(&self) -> ServerDomain {
        self.registry.domain()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn transport(&self) -> TransportMode {
        self.transport
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Probe the domain's primary document.
    pub async fn health(&self) -> Health {
        let kind = primary_document(self.domain());
        let status = match self.registry.store().load(kind).await {
            Ok(_) => Health::HEALTHY,
            Err(e) => {
                log::warn!("{} health check failed: {e}", self.domain());
                Health::DEGRADED
            }
        };
        Health {
            status: status.to_string(),
            uptime_seconds: self.uptime_seconds(),
            domain: self.domain(),
            pid: std::process::id(),
        }
    }

    pub fn info(&self) -> ServerInfo {
        let domain = self.domain();
        ServerInfo {
            domain,
            name: domain.display_name().to_string(),
            description: domain.description().to_string(),
            version: domain.catalog_version().to_string(),
            port: self.port,
            transport: self.transport,
            started_at: self.started_at,
            tools: self
                .registry
                .tool_names()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// Route one decoded request to the registry.
    pub async fn dispatch(&self, call: ToolCall) -> Envelope {
        self.registry.invoke(&call.tool, call.params).await
    }

    /// Serve on the configured transport until shutdown (HTTP) or EOF (stdio).
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be started or fails.
    pub async fn run(self, host: IpAddr) -> Result<()> {
        let instance = Arc::new(self);
        match instance.transport {
            TransportMode::Http => {
                let addr = SocketAddr::new(host, instance.port);
                crate::http::serve(instance, addr).await
            }
            TransportMode::Stdio => crate::stdio::serve(&instance).await,
        }
    }
}

impl fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerInstance")
            .field("domain", &self.domain())
            .field("port", &self.port)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// Parse a bind address, accepting `localhost`.
///
/// # Errors
///
/// Returns a configuration error for anything else that is not an IP.
pub fn parse_host(host: &str) -> Result<IpAddr> {
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::from([127, 0, 0, 1]));
    }
    host.parse()
        .map_err(|_| Error::config(format!("invalid host address '{host}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shopfloor_store::fixtures::fixture_dir;

    #[tokio::test]
    async fn test_health_and_info() {
        let dir = fixture_dir().unwrap();
        let store = Arc::new(DataStore::new(dir.path().to_path_buf()));
        let instance =
            ServerInstance::new(ServerDomain::Maintenance, store, 8001, TransportMode::Http).unwrap();

        let health = instance.health().await;
        assert!(health.is_healthy());
        assert_eq!(health.pid, std::process::id());

        let info = instance.info();
        assert_eq!(info.port, 8001);
        assert_eq!(info.version, "2.0.0");
        assert!(info.tools.contains(&"get_maintenance_history".to_string()));
        assert_eq!(serde_json::to_value(info.transport).unwrap(), json!("http"));
    }

    #[tokio::test]
    async fn test_degraded_without_primary_document() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(DataStore::new(dir.path().to_path_buf()));
        let instance =
            ServerInstance::new(ServerDomain::Business, store, 8002, TransportMode::Stdio).unwrap();
        assert_eq!(instance.health().await.status, Health::DEGRADED);
    }

    #[test]
    fn test_parse_host() {
        assert_eq!(parse_host("localhost").unwrap(), IpAddr::from([127, 0, 0, 1]));
        assert!(parse_host("0.0.0.0").is_ok());
        assert!(parse_host("plant-a").is_err());
    }
}

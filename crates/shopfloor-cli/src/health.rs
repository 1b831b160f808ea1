//! Health probing of running servers.

use std::time::Duration;

use async_trait::async_trait;
use shopfloor_server::Health;

use crate::supervisor::SupervisorError;

/// Something that can ask a server for its `/health` report.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Fetch the health report of the server at `host:port`.
    ///
    /// A degraded server still returns its report; only an unreachable
    /// server or an unreadable response is an error.
    async fn probe(&self, host: &str, port: u16) -> Result<Health, SupervisorError>;
}

/// Probes `GET /health` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    /// Build a probe whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, SupervisorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SupervisorError::Probe(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, host: &str, port: u16) -> Result<Health, SupervisorError> {
        let url = format!("http://{host}:{port}/health");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SupervisorError::Probe(format!("{url}: {e}")))?;
        response
            .json::<Health>()
            .await
            .map_err(|e| SupervisorError::Probe(format!("{url}: unreadable health report: {e}")))
    }
}

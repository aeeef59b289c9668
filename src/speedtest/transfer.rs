//! Timed downloads through a candidate endpoint
//!
//! Two strategies implement [`Transfer`]:
//! - [`ProxyRelay`] routes the request through the candidate as an HTTP (or
//!   SOCKS5) proxy.
//! - [`DirectConnect`] pins the test host name to the candidate address and
//!   connects to it directly, TLS is still verified against the host name.

use crate::speedtest::models::{CandidateEndpoint, RelayScheme};
use async_trait::async_trait;
use reqwest::{Client, Proxy, Response, StatusCode, Url};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Bytes received and time spent in one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSample {
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Failure of a single download attempt
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid test URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected HTTP status: {0}")]
    Status(StatusCode),
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// Performs one bounded download through an endpoint
#[async_trait]
pub trait Transfer: Send + Sync {
    async fn download(&self, endpoint: &CandidateEndpoint) -> Result<TransferSample, ProbeError>;
}

/// Parameters shared by both strategies
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub test_url: String,
    /// Reading stops once this many bytes arrived
    pub expected_bytes: u64,
    /// Budget for one attempt, connection included
    pub attempt_timeout: Duration,
    /// Port used when the endpoint has none
    pub default_port: u16,
}

/// Send the request, then read the body until `expected_bytes`, end of body
/// or the deadline, whichever comes first.
async fn timed_get(
    client: &Client,
    url: Url,
    settings: &TransferSettings,
) -> Result<TransferSample, ProbeError> {
    let start = Instant::now();
    let deadline = start + settings.attempt_timeout;

    let response = match tokio::time::timeout_at(deadline, client.get(url).send()).await {
        Ok(result) => result?,
        Err(_) => return Err(ProbeError::Timeout(settings.attempt_timeout)),
    };
    if !response.status().is_success() {
        return Err(ProbeError::Status(response.status()));
    }

    let bytes = read_body(response, settings.expected_bytes, deadline).await;
    Ok(TransferSample {
        bytes,
        elapsed: start.elapsed(),
    })
}

async fn read_body(mut response: Response, expected_bytes: u64, deadline: Instant) -> u64 {
    let mut bytes = 0u64;
    while bytes < expected_bytes {
        match tokio::time::timeout_at(deadline, response.chunk()).await {
            Ok(Ok(Some(chunk))) => bytes += chunk.len() as u64,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                debug!(bytes, error = %e, "body interrupted");
                break;
            }
            Err(_) => {
                debug!(bytes, "attempt deadline reached");
                break;
            }
        }
    }
    bytes
}

fn parse_url(raw: &str) -> Result<Url, ProbeError> {
    Url::parse(raw).map_err(|e| ProbeError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Download routed through the candidate acting as a proxy
#[derive(Debug, Clone)]
pub struct ProxyRelay {
    settings: TransferSettings,
    scheme: RelayScheme,
}

impl ProxyRelay {
    pub fn new(settings: TransferSettings, scheme: RelayScheme) -> Self {
        Self { settings, scheme }
    }

    fn create_client(&self, endpoint: &CandidateEndpoint) -> Result<Client, ProbeError> {
        let proxy_url = endpoint.relay_url(self.scheme, self.settings.default_port);
        let proxy = Proxy::all(&proxy_url).map_err(ProbeError::Client)?;

        Client::builder()
            .proxy(proxy)
            .connect_timeout(self.settings.attempt_timeout)
            .build()
            .map_err(ProbeError::Client)
    }
}

#[async_trait]
impl Transfer for ProxyRelay {
    async fn download(&self, endpoint: &CandidateEndpoint) -> Result<TransferSample, ProbeError> {
        let url = parse_url(&self.settings.test_url)?;
        let client = self.create_client(endpoint)?;
        timed_get(&client, url, &self.settings).await
    }
}

/// Download from the candidate itself, with the test host resolved to it
#[derive(Debug, Clone)]
pub struct DirectConnect {
    settings: TransferSettings,
}

impl DirectConnect {
    pub fn new(settings: TransferSettings) -> Self {
        Self { settings }
    }

    /// Test URL with the endpoint port applied, and the pinned socket address.
    ///
    /// The host must be a domain name, resolve overrides do not apply to IP literals.
    fn target(
        &self,
        endpoint: &CandidateEndpoint,
    ) -> Result<(Url, String, SocketAddr), ProbeError> {
        let mut url = parse_url(&self.settings.test_url)?;
        let host = url
            .domain()
            .ok_or_else(|| ProbeError::InvalidUrl {
                url: self.settings.test_url.clone(),
                reason: "host must be a domain name".to_string(),
            })?
            .to_string();

        let port = endpoint.port_or(self.settings.default_port);
        url.set_port(Some(port)).map_err(|_| ProbeError::InvalidUrl {
            url: self.settings.test_url.clone(),
            reason: "cannot carry a port".to_string(),
        })?;

        Ok((url, host, SocketAddr::new(IpAddr::V4(endpoint.address), port)))
    }
}

#[async_trait]
impl Transfer for DirectConnect {
    async fn download(&self, endpoint: &CandidateEndpoint) -> Result<TransferSample, ProbeError> {
        let (url, host, addr) = self.target(endpoint)?;
        let client = Client::builder()
            .no_proxy()
            .resolve(&host, addr)
            .connect_timeout(self.settings.attempt_timeout)
            .build()
            .map_err(ProbeError::Client)?;
        timed_get(&client, url, &self.settings).await
    }
}

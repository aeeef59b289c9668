//! Speed test data models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Scheme used to talk to a candidate acting as a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RelayScheme {
    #[default]
    Http,
    Socks5,
}

impl fmt::Display for RelayScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayScheme::Http => write!(f, "http"),
            RelayScheme::Socks5 => write!(f, "socks5"),
        }
    }
}

/// A single candidate address read from the input list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEndpoint {
    pub address: Ipv4Addr,
    pub port: Option<u16>,
    /// Label written after `#` in the input, if any
    pub label: Option<String>,
    /// 1-based line number in the input
    pub line: usize,
}

impl CandidateEndpoint {
    pub fn new(address: Ipv4Addr, port: Option<u16>, label: Option<String>, line: usize) -> Self {
        Self {
            address,
            port,
            label,
            line,
        }
    }

    /// Port to use, falling back to `default` when the input gave none
    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }

    /// Relay URL for this endpoint, e.g. `http://1.2.3.4:8080`
    pub fn relay_url(&self, scheme: RelayScheme, default_port: u16) -> String {
        format!("{}://{}:{}", scheme, self.address, self.port_or(default_port))
    }

    /// Address in `IP[:PORT]` form, port only when the input had one
    pub fn to_simple_string(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.address, port),
            None => self.address.to_string(),
        }
    }
}

impl fmt::Display for CandidateEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_simple_string())
    }
}

/// Result of probing one endpoint, after all attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub endpoint: CandidateEndpoint,
    pub success: bool,
    /// MiB per second, one decimal place; always 0.0 on failure
    pub speed_mbps: f64,
    pub bytes_transferred: u64,
    pub attempts: u32,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn succeeded(
        endpoint: CandidateEndpoint,
        speed_mbps: f64,
        bytes_transferred: u64,
        attempts: u32,
    ) -> Self {
        Self {
            endpoint,
            success: true,
            speed_mbps,
            bytes_transferred,
            attempts,
            error: None,
        }
    }

    pub fn failed(
        endpoint: CandidateEndpoint,
        bytes_transferred: u64,
        attempts: u32,
        error: Option<String>,
    ) -> Self {
        Self {
            endpoint,
            success: false,
            speed_mbps: 0.0,
            bytes_transferred,
            attempts,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

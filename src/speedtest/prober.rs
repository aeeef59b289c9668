//! Throughput prober with retry policy

use crate::speedtest::models::{CandidateEndpoint, ProbeOutcome, RelayScheme};
use crate::speedtest::transfer::{
    DirectConnect, ProxyRelay, Transfer, TransferSample, TransferSettings,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default payload, 10 MiB from the Cloudflare speed test endpoint
pub const DEFAULT_TEST_URL: &str = "https://speed.cloudflare.com/__down?bytes=10485760";

/// Default expected payload size in bytes
pub const DEFAULT_EXPECTED_BYTES: u64 = 10 * 1024 * 1024;

/// Default budget for a single attempt in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default number of retries after the first attempt
const DEFAULT_RETRIES: u32 = 2;

/// Default wait between attempts in seconds
const DEFAULT_BACKOFF_SECS: u64 = 2;

/// Default pause after each endpoint in seconds
const DEFAULT_DELAY_SECS: u64 = 1;

/// Default port for candidates that do not give one
pub const DEFAULT_PORT: u16 = 443;

/// Fraction of the expected payload that must arrive for a success
pub const MIN_TRANSFER_RATIO: f64 = 0.9;

const BYTES_PER_MIB: f64 = 1_048_576.0;

/// How the payload is fetched through a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProbeMode {
    /// Resolve the test host to the candidate and download from it directly
    #[default]
    DirectConnect,
    /// Use the candidate as a proxy for the test URL
    ProxyRelay,
}

impl fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMode::DirectConnect => write!(f, "direct"),
            ProbeMode::ProxyRelay => write!(f, "proxy"),
        }
    }
}

/// Configuration for the prober
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub mode: ProbeMode,
    /// Scheme for relays in [`ProbeMode::ProxyRelay`]
    pub relay_scheme: RelayScheme,
    /// URL of the fixed-size payload
    pub test_url: String,
    /// Size of the payload in bytes
    pub expected_bytes: u64,
    /// Budget for each attempt
    pub attempt_timeout: Duration,
    /// Retries after the first attempt
    pub retries: u32,
    /// Wait between failed attempts
    pub retry_backoff: Duration,
    /// Pause after each endpoint, whatever the outcome
    pub probe_delay: Duration,
    /// Port for candidates without one
    pub default_port: u16,
    /// Number of endpoints probed at once
    pub concurrency: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            mode: ProbeMode::default(),
            relay_scheme: RelayScheme::default(),
            test_url: DEFAULT_TEST_URL.to_string(),
            expected_bytes: DEFAULT_EXPECTED_BYTES,
            attempt_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
            retry_backoff: Duration::from_secs(DEFAULT_BACKOFF_SECS),
            probe_delay: Duration::from_secs(DEFAULT_DELAY_SECS),
            default_port: DEFAULT_PORT,
            concurrency: 1,
        }
    }
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: ProbeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_relay_scheme(mut self, scheme: RelayScheme) -> Self {
        self.relay_scheme = scheme;
        self
    }

    pub fn with_test_url(mut self, url: String) -> Self {
        self.test_url = url;
        self
    }

    pub fn with_expected_bytes(mut self, bytes: u64) -> Self {
        self.expected_bytes = bytes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            test_url: self.test_url.clone(),
            expected_bytes: self.expected_bytes,
            attempt_timeout: self.attempt_timeout,
            default_port: self.default_port,
        }
    }
}

/// Classified result of one attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub success: bool,
    /// MiB/s rounded to one decimal, 0.0 when not successful
    pub speed_mbps: f64,
}

/// Classify a sample against the expected payload size
pub fn measure(sample: &TransferSample, expected_bytes: u64) -> Measurement {
    let secs = sample.elapsed.as_secs_f64();
    let speed = if secs > 0.0 {
        (sample.bytes as f64 / secs / BYTES_PER_MIB * 10.0).round() / 10.0
    } else {
        0.0
    };
    let enough = sample.bytes as f64 >= MIN_TRANSFER_RATIO * expected_bytes as f64;

    if enough && speed > 0.0 {
        Measurement {
            success: true,
            speed_mbps: speed,
        }
    } else {
        Measurement {
            success: false,
            speed_mbps: 0.0,
        }
    }
}

/// Prober running bounded downloads with retries
#[derive(Clone)]
pub struct SpeedProber {
    config: ProbeConfig,
    transfer: Arc<dyn Transfer>,
}

impl SpeedProber {
    /// Prober using the transfer strategy selected by `config.mode`
    pub fn with_config(config: ProbeConfig) -> Self {
        let settings = config.transfer_settings();
        let transfer: Arc<dyn Transfer> = match config.mode {
            ProbeMode::DirectConnect => Arc::new(DirectConnect::new(settings)),
            ProbeMode::ProxyRelay => Arc::new(ProxyRelay::new(settings, config.relay_scheme)),
        };
        Self { config, transfer }
    }

    /// Prober with a caller-supplied transfer strategy
    pub fn with_transfer(config: ProbeConfig, transfer: Arc<dyn Transfer>) -> Self {
        Self { config, transfer }
    }

    /// Probe one endpoint, making up to `retries + 1` attempts
    pub async fn probe(&self, endpoint: &CandidateEndpoint) -> ProbeOutcome {
        let max_attempts = self.config.retries + 1;
        let mut last_bytes = 0;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.transfer.download(endpoint).await {
                Ok(sample) => {
                    let m = measure(&sample, self.config.expected_bytes);
                    debug!(
                        endpoint = %endpoint,
                        attempt,
                        bytes = sample.bytes,
                        elapsed_ms = sample.elapsed.as_millis() as u64,
                        speed = m.speed_mbps,
                        "attempt finished"
                    );
                    if m.success {
                        return ProbeOutcome::succeeded(
                            endpoint.clone(),
                            m.speed_mbps,
                            sample.bytes,
                            attempt,
                        );
                    }
                    last_bytes = sample.bytes;
                    last_error = Some(format!(
                        "received {} of {} bytes in {:.1}s",
                        sample.bytes,
                        self.config.expected_bytes,
                        sample.elapsed.as_secs_f64()
                    ));
                }
                Err(e) => {
                    last_bytes = 0;
                    last_error = Some(e.to_string());
                }
            }

            if attempt < max_attempts {
                info!(
                    endpoint = %endpoint,
                    attempt,
                    max_attempts,
                    error = last_error.as_deref().unwrap_or_default(),
                    "attempt failed, retrying"
                );
                tokio::time::sleep(self.config.retry_backoff).await;
            }
        }

        ProbeOutcome::failed(endpoint.clone(), last_bytes, max_attempts, last_error)
    }
}

//! IP Speedtest - throughput ranking for proxy/relay addresses
//!
//! Reads a list of candidate IPv4 endpoints, downloads a fixed-size payload
//! through each one and writes the reachable ones ranked by speed, tagged
//! with their approximate country.

pub mod speedtest;

pub use speedtest::*;

use std::path::PathBuf;

/// Application result type
pub type Result<T> = anyhow::Result<T>;

/// Default candidate list
pub const DEFAULT_INPUT: &str = "ip.txt";

/// Default report path
pub const DEFAULT_OUTPUT: &str = "speed_ip.txt";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Candidate list path
    pub input: PathBuf,
    /// Report path
    pub output: PathBuf,
    pub probe: ProbeConfig,
    pub geo: GeoConfig,
    pub report: ReportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            output: PathBuf::from(DEFAULT_OUTPUT),
            probe: ProbeConfig::default(),
            geo: GeoConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, input: PathBuf) -> Self {
        self.input = input;
        self
    }

    pub fn with_output(mut self, output: PathBuf) -> Self {
        self.output = output;
        self
    }

    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_geo(mut self, geo: GeoConfig) -> Self {
        self.geo = geo;
        self
    }

    pub fn with_report(mut self, report: ReportConfig) -> Self {
        self.report = report;
        self
    }
}

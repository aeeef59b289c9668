//! Speed test module for ranking proxy/relay addresses
//!
//! This module provides functionality for:
//! - Parsing candidate lists (`IP[:PORT]#LABEL`)
//! - Resolving approximate location through a provider fallback chain
//! - Measuring download throughput through each candidate, with retries
//! - Building a ranked report in plain text or markdown

pub mod country;
pub mod geo;
pub mod models;
pub mod parser;
pub mod prober;
pub mod report;
pub mod runner;
pub mod transfer;

pub use country::FlagStyle;
pub use geo::{FallbackPolicy, GeoConfig, GeoError, GeoInfo, GeoProvider, GeoResolver};
pub use models::{CandidateEndpoint, ProbeOutcome, RelayScheme};
pub use parser::{EndpointParser, InputError, ParseError, ParsedInput};
pub use prober::{ProbeConfig, ProbeMode, SpeedProber};
pub use report::{OutputFormat, Report, ReportConfig, ReportRecord, ReportWriter, Summary};
pub use runner::SpeedTest;
pub use transfer::{ProbeError, Transfer, TransferSample};

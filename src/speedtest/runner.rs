//! Speed test pipeline
//!
//! Parse the candidate list, then for each endpoint resolve its location,
//! probe it and pause before the next one. Results are handed to
//! [`Report::build`] in input order.

use crate::speedtest::geo::GeoResolver;
use crate::speedtest::models::CandidateEndpoint;
use crate::speedtest::parser::{ParsedInput, EndpointParser};
use crate::speedtest::prober::SpeedProber;
use crate::speedtest::report::{EndpointResult, Report, ReportWriter};
use crate::{Config, Result};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

/// Runs the whole pipeline for one input list
pub struct SpeedTest {
    config: Config,
    resolver: GeoResolver,
    prober: SpeedProber,
}

impl SpeedTest {
    pub fn new(config: Config, resolver: GeoResolver, prober: SpeedProber) -> Self {
        Self {
            config,
            resolver,
            prober,
        }
    }

    /// Build the default provider chain and the prober from `config`
    pub fn with_config(config: Config) -> Result<Self> {
        let resolver = GeoResolver::with_config(&config.geo)?;
        let prober = SpeedProber::with_config(config.probe.clone());
        Ok(Self::new(config, resolver, prober))
    }

    /// Locate and probe one endpoint, then wait out the inter-test delay
    pub async fn test_endpoint(
        &self,
        endpoint: CandidateEndpoint,
        index: usize,
        total: usize,
    ) -> EndpointResult {
        let geo = self.resolver.resolve(endpoint.address).await;
        println!(
            "[{}/{}] Testing {} - {} {}",
            index, total, endpoint, geo.label, geo.flag
        );

        let outcome = self.prober.probe(&endpoint).await;
        if outcome.success {
            println!(
                "  -> ok: {:.1}MB/s ({} bytes, {} attempt(s))",
                outcome.speed_mbps, outcome.bytes_transferred, outcome.attempts
            );
        } else {
            println!(
                "  -> failed after {} attempt(s): {}",
                outcome.attempts,
                outcome.error.as_deref().unwrap_or("unreachable")
            );
        }

        tokio::time::sleep(self.config.probe.probe_delay).await;

        EndpointResult { endpoint, geo, outcome }
    }

    /// Probe every candidate and build the report
    pub async fn run(&self, input: ParsedInput) -> Report {
        for rejected in &input.rejected {
            warn!(line = rejected.line(), "skipping invalid line: {}", rejected);
        }

        let total = input.candidates.len();
        let concurrency = self.config.probe.concurrency.max(1);
        info!(
            candidates = total,
            skipped = input.rejected.len(),
            concurrency,
            mode = %self.config.probe.mode,
            "starting speed test"
        );

        // buffered() yields in input order, so equal speeds keep input order
        let results: Vec<EndpointResult> = stream::iter(input.candidates.into_iter().enumerate())
            .map(|(i, endpoint)| self.test_endpoint(endpoint, i + 1, total))
            .buffered(concurrency)
            .collect()
            .await;

        Report::build(results, input.rejected.len())
    }

    /// Read the configured input, run, and write the report.
    ///
    /// Input problems surface as [`crate::speedtest::InputError`].
    pub async fn run_file(&self) -> Result<Report> {
        let input = EndpointParser::parse_file(&self.config.input)?;
        println!(
            "Loaded {} candidates from {:?} ({} invalid lines)",
            input.candidates.len(),
            self.config.input,
            input.rejected.len()
        );

        let report = self.run(input).await;

        ReportWriter::new(self.config.report.clone())
            .write_to_file(&report, &self.config.output)?;
        let s = report.summary;
        println!(
            "\nDone: {} succeeded, {} failed, {} skipped (total {}). Report saved to {:?}",
            s.succeeded, s.failed, s.skipped, s.total, self.config.output
        );
        Ok(report)
    }
}

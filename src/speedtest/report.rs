//! Result aggregation and report rendering
//!
//! [`Report::build`] filters and orders outcomes. [`OutputFormat`] turns a
//! report into text. Neither knows how the outcomes were produced.

use crate::speedtest::geo::GeoInfo;
use crate::speedtest::models::{CandidateEndpoint, ProbeOutcome};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Timestamp format used in report headers
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// One probed endpoint with everything the report needs
#[derive(Debug, Clone)]
pub struct EndpointResult {
    pub endpoint: CandidateEndpoint,
    pub geo: GeoInfo,
    pub outcome: ProbeOutcome,
}

/// A successful endpoint in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
    pub endpoint: CandidateEndpoint,
    pub geo: GeoInfo,
    pub speed_mbps: f64,
    pub bytes_transferred: u64,
}

impl ReportRecord {
    pub fn sort_key(&self) -> f64 {
        self.speed_mbps
    }

    /// `1.2.3.4[:port]#<geo>+12.3MB/s`
    pub fn to_line(&self) -> String {
        format!(
            "{}#{}+{:.1}MB/s",
            self.endpoint.to_simple_string(),
            self.geo.flag,
            self.speed_mbps
        )
    }
}

/// Run counts, `total == succeeded + failed + skipped`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Lines rejected by the parser
    pub skipped: usize,
}

/// Successful records sorted by speed plus the failures
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub records: Vec<ReportRecord>,
    pub failures: Vec<ProbeOutcome>,
    pub summary: Summary,
}

impl Report {
    /// Build a report from results in input order.
    ///
    /// Records are sorted by descending speed; equal speeds keep input order.
    pub fn build(results: Vec<EndpointResult>, skipped: usize) -> Self {
        let total = results.len() + skipped;
        let (good, bad): (Vec<_>, Vec<_>) =
            results.into_iter().partition(|r| r.outcome.is_success());

        let mut records: Vec<ReportRecord> = good
            .into_iter()
            .map(|r| ReportRecord {
                speed_mbps: r.outcome.speed_mbps,
                bytes_transferred: r.outcome.bytes_transferred,
                endpoint: r.endpoint,
                geo: r.geo,
            })
            .collect();
        // sort_by is stable
        records.sort_by(|a, b| b.sort_key().total_cmp(&a.sort_key()));

        let failures: Vec<ProbeOutcome> = bad.into_iter().map(|r| r.outcome).collect();

        Self {
            summary: Summary {
                total,
                succeeded: records.len(),
                failed: failures.len(),
                skipped,
            },
            records,
            failures,
        }
    }
}

/// Report presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    /// Comment header followed by one `IP#FLAG+SPEED` line per endpoint
    #[default]
    PlainText,
    /// Markdown document with a ranked table
    Markdown,
}

impl OutputFormat {
    pub fn render(&self, report: &Report, generated_at: DateTime<Utc>) -> String {
        match self {
            OutputFormat::PlainText => render_plain(report, generated_at),
            OutputFormat::Markdown => render_markdown(report, generated_at),
        }
    }
}

fn render_plain(report: &Report, generated_at: DateTime<Utc>) -> String {
    let s = &report.summary;
    let mut out = String::new();
    out.push_str("# IP speed test results (IP#FLAG+SPEED, fastest first)\n");
    let _ = writeln!(out, "# Generated: {}", generated_at.format(TIMESTAMP_FORMAT));
    let _ = writeln!(
        out,
        "# total: {}, succeeded: {}, failed: {}, skipped: {}",
        s.total, s.succeeded, s.failed, s.skipped
    );
    out.push('\n');
    for record in &report.records {
        out.push_str(&record.to_line());
        out.push('\n');
    }
    out
}

fn location_cell(geo: &GeoInfo) -> String {
    if geo.flag.starts_with("http://") || geo.flag.starts_with("https://") {
        let alt = geo.country_code.as_deref().unwrap_or("??");
        format!("![{}]({}) {}", alt, geo.flag, geo.label)
    } else if geo.flag == geo.label {
        geo.label.clone()
    } else {
        format!("{} {}", geo.flag, geo.label)
    }
}

fn render_markdown(report: &Report, generated_at: DateTime<Utc>) -> String {
    let s = &report.summary;
    let mut out = String::new();
    out.push_str("# IP Speed Test Results\n\n");
    let _ = writeln!(out, "- Generated: {}", generated_at.format(TIMESTAMP_FORMAT));
    let _ = writeln!(out, "- total: {}", s.total);
    let _ = writeln!(out, "- succeeded: {}", s.succeeded);
    let _ = writeln!(out, "- failed: {}", s.failed);
    let _ = writeln!(out, "- skipped: {}", s.skipped);
    out.push('\n');

    if report.records.is_empty() {
        out.push_str("_No endpoint passed the speed test._\n");
        return out;
    }

    out.push_str("| # | Address | Location | Speed |\n");
    out.push_str("|---|---------|----------|-------|\n");
    for (rank, record) in report.records.iter().enumerate() {
        let _ = writeln!(
            out,
            "| {} | `{}` | {} | {:.1}MB/s |",
            rank + 1,
            record.endpoint.to_simple_string(),
            location_cell(&record.geo),
            record.speed_mbps
        );
    }
    out
}

/// Report settings
#[derive(Debug, Clone, Default)]
pub struct ReportConfig {
    pub format: OutputFormat,
}

impl ReportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}

/// Writes rendered reports to disk
pub struct ReportWriter {
    config: ReportConfig,
}

impl ReportWriter {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    pub fn render(&self, report: &Report, generated_at: DateTime<Utc>) -> String {
        self.config.format.render(report, generated_at)
    }

    /// Render with the current time and write to `path`
    pub fn write_to_file<P: AsRef<Path>>(&self, report: &Report, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = self.render(report, Utc::now());
        fs::write(path, content)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }
}

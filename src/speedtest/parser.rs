//! Candidate list parser
//!
//! Each retained line has the form `IPv4[:port]#label`. Blank lines, `#`
//! comments and `-` list markers are ignored.

use crate::speedtest::models::CandidateEndpoint;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// `IP[:PORT] #LABEL`, port is optional and part of the same match
static LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})(?::(\d+))?\s*#(.*)$")
        .expect("Invalid candidate line regex")
});

/// Why a retained line was not turned into a candidate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: expected IP[:PORT]#LABEL, got {text:?}")]
    Malformed { line: usize, text: String },
    #[error("line {line}: octet out of range in {text:?}")]
    InvalidAddress { line: usize, text: String },
    #[error("line {line}: invalid port in {text:?}")]
    InvalidPort { line: usize, text: String },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::Malformed { line, .. }
            | ParseError::InvalidAddress { line, .. }
            | ParseError::InvalidPort { line, .. } => *line,
        }
    }
}

/// Fatal input conditions, the run stops before probing
#[derive(Debug, Error)]
pub enum InputError {
    #[error("input file {0} does not exist")]
    NotFound(PathBuf),
    #[error("no valid candidate in {0}")]
    NoCandidates(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Candidates and rejected lines from one input, in input order
#[derive(Debug, Clone, Default)]
pub struct ParsedInput {
    pub candidates: Vec<CandidateEndpoint>,
    pub rejected: Vec<ParseError>,
}

impl ParsedInput {
    /// Number of retained (non-comment, non-blank) lines
    pub fn retained(&self) -> usize {
        self.candidates.len() + self.rejected.len()
    }
}

/// Parser for candidate lists
pub struct EndpointParser;

impl EndpointParser {
    /// Returns true for lines that are skipped without being counted
    pub fn is_ignored(line: &str) -> bool {
        line.is_empty() || line.starts_with('#') || line.starts_with('-')
    }

    /// Parse a single line, `None` when the line is ignored
    pub fn parse_line(line: &str, line_no: usize) -> Option<Result<CandidateEndpoint, ParseError>> {
        let line = line.trim();
        if Self::is_ignored(line) {
            return None;
        }
        Some(Self::parse_candidate(line, line_no))
    }

    fn parse_candidate(line: &str, line_no: usize) -> Result<CandidateEndpoint, ParseError> {
        let caps = LINE_REGEX.captures(line).ok_or_else(|| ParseError::Malformed {
            line: line_no,
            text: line.to_string(),
        })?;

        let mut octets = [0u8; 4];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = caps[i + 1].parse().map_err(|_| ParseError::InvalidAddress {
                line: line_no,
                text: line.to_string(),
            })?;
        }

        let port = match caps.get(5) {
            Some(m) => match m.as_str().parse::<u16>() {
                Ok(port) if port != 0 => Some(port),
                _ => {
                    return Err(ParseError::InvalidPort {
                        line: line_no,
                        text: line.to_string(),
                    })
                }
            },
            None => None,
        };

        let label = caps
            .get(6)
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
            .map(String::from);

        Ok(CandidateEndpoint::new(Ipv4Addr::from(octets), port, label, line_no))
    }

    /// Lazily parse lines, yielding candidates and errors for retained lines
    pub fn parse_lines<'a, I>(
        lines: I,
    ) -> impl Iterator<Item = Result<CandidateEndpoint, ParseError>> + 'a
    where
        I: IntoIterator<Item = &'a str>,
        I::IntoIter: 'a,
    {
        lines
            .into_iter()
            .enumerate()
            .filter_map(|(idx, line)| Self::parse_line(line, idx + 1))
    }

    /// Parse a whole document
    pub fn parse_string(content: &str) -> ParsedInput {
        let mut parsed = ParsedInput::default();
        for item in Self::parse_lines(content.lines()) {
            match item {
                Ok(candidate) => parsed.candidates.push(candidate),
                Err(e) => parsed.rejected.push(e),
            }
        }
        parsed
    }

    /// Parse a candidate file
    ///
    /// Fails with [`InputError::NotFound`] when the file is missing and with
    /// [`InputError::NoCandidates`] when no line yields a candidate.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<ParsedInput, InputError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                InputError::NotFound(path.to_path_buf())
            } else {
                InputError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let parsed = Self::parse_string(&content);
        if parsed.candidates.is_empty() {
            return Err(InputError::NoCandidates(path.to_path_buf()));
        }
        Ok(parsed)
    }
}

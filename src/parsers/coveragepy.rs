/// Parser for the coverage.py JSON report (`coverage json`).
///
/// Reference: https://coverage.readthedocs.io/en/latest/cmd.html#cmd-json
///
/// The document has three top-level keys:
///   - `meta`:   `{ "version", "timestamp", "branch_coverage", "show_contexts" }`
///   - `files`:  `{ "<path>": { "executed_lines", "missing_lines", "excluded_lines",
///               "summary", "executed_branches"?, "missing_branches"? } }`
///   - `totals`: same shape as a file `summary`
///
/// Branch arcs are `[from, to]` pairs; a negative line marks a synthetic
/// endpoint (an exit from the enclosing code object).
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;

use super::Parser;
use crate::error::{PrcovError, Result};
use crate::model::*;

/// coverage.py JSON parser.
pub struct CoveragePyParser;

impl Parser for CoveragePyParser {
    fn parse(&self, input: &[u8]) -> Result<Coverage> {
        parse(input)
    }
}

#[derive(Deserialize)]
struct RawReport {
    meta: RawMeta,
    files: BTreeMap<String, RawFile>,
    totals: RawSummary,
}

#[derive(Deserialize)]
struct RawMeta {
    version: String,
    timestamp: String,
    branch_coverage: bool,
    show_contexts: bool,
}

#[derive(Deserialize)]
struct RawFile {
    executed_lines: Vec<u32>,
    missing_lines: Vec<u32>,
    excluded_lines: Vec<u32>,
    summary: RawSummary,
    executed_branches: Option<Vec<[i64; 2]>>,
    missing_branches: Option<Vec<[i64; 2]>>,
}

#[derive(Deserialize)]
struct RawSummary {
    covered_lines: u32,
    num_statements: u32,
    percent_covered_display: String,
    missing_lines: u32,
    excluded_lines: u32,
    num_branches: Option<u32>,
    num_partial_branches: Option<u32>,
    covered_branches: Option<u32>,
    missing_branches: Option<u32>,
}

/// Parse a coverage.py JSON report from raw bytes.
pub fn parse(input: &[u8]) -> Result<Coverage> {
    let raw: RawReport = serde_json::from_slice(input)?;

    let meta = CoverageMetadata {
        timestamp: parse_timestamp(&raw.meta.timestamp)?,
        version: raw.meta.version,
        branch_coverage: raw.meta.branch_coverage,
        show_contexts: raw.meta.show_contexts,
    };

    let mut files = BTreeMap::new();
    for (path, file) in raw.files {
        let file = convert_file(path.clone(), file)?;
        files.insert(path, file);
    }

    Ok(Coverage {
        meta,
        info: convert_summary(raw.totals),
        files,
    })
}

/// coverage.py writes naive local timestamps ("2021-12-26T22:27:40.683570");
/// an RFC 3339 timestamp with an offset is accepted too.
fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.naive_utc()))
        .map_err(|e| PrcovError::Configuration(format!("invalid report timestamp '{value}': {e}")))
}

fn convert_file(path: String, raw: RawFile) -> Result<FileCoverage> {
    Ok(FileCoverage {
        executed_branches: raw.executed_branches.map(|b| convert_branches(&path, b)).transpose()?,
        missing_branches: raw.missing_branches.map(|b| convert_branches(&path, b)).transpose()?,
        executed_lines: sorted_lines(raw.executed_lines),
        missing_lines: sorted_lines(raw.missing_lines),
        excluded_lines: sorted_lines(raw.excluded_lines),
        info: convert_summary(raw.summary),
        path,
    })
}

fn convert_branches(path: &str, raw: Vec<[i64; 2]>) -> Result<Vec<BranchPair>> {
    raw.into_iter()
        .map(|[from, to]| {
            match (BranchEndpoint::from_signed(from), BranchEndpoint::from_signed(to)) {
                (Some(from), Some(to)) => Ok(BranchPair::new(from, to)),
                _ => Err(PrcovError::Configuration(format!(
                    "branch [{from}, {to}] in '{path}' is out of range"
                ))),
            }
        })
        .collect()
}

/// The grouping code relies on sorted, duplicate-free line lists.
fn sorted_lines(mut lines: Vec<u32>) -> Vec<u32> {
    lines.sort_unstable();
    lines.dedup();
    lines
}

fn convert_summary(raw: RawSummary) -> CoverageInfo {
    CoverageInfo {
        percent_covered: compute_coverage(u64::from(raw.covered_lines), u64::from(raw.num_statements)),
        covered_lines: raw.covered_lines,
        num_statements: raw.num_statements,
        percent_covered_display: raw.percent_covered_display,
        missing_lines: raw.missing_lines,
        excluded_lines: raw.excluded_lines,
        num_branches: raw.num_branches,
        num_partial_branches: raw.num_partial_branches,
        covered_branches: raw.covered_branches,
        missing_branches: raw.missing_branches,
    }
}

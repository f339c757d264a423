//! Uniform in-memory representation of a coverage report and of the
//! coverage of a diff against it. Parsers produce a `Coverage`; the diff
//! coverage calculator derives a `DiffCoverage` from it.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::error::PrcovError;

/// Compute a coverage ratio, returning 1 (fully covered) when the total is zero.
#[must_use]
pub fn compute_coverage(covered: u64, total: u64) -> Ratio {
    if total == 0 {
        Ratio::ONE
    } else {
        Ratio::reduced(covered, total)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// An exact, non-negative rational number. Always stored reduced, with a
/// non-zero denominator.
#[derive(Debug, Clone, Copy)]
pub struct Ratio {
    numerator: u64,
    denominator: u64,
}

impl Ratio {
    pub const ZERO: Ratio = Ratio {
        numerator: 0,
        denominator: 1,
    };
    pub const ONE: Ratio = Ratio {
        numerator: 1,
        denominator: 1,
    };

    /// Build `numerator / denominator`, or `None` for a zero denominator.
    #[must_use]
    pub fn new(numerator: u64, denominator: u64) -> Option<Self> {
        (denominator != 0).then(|| Self::reduced(numerator, denominator))
    }

    #[must_use]
    pub fn from_integer(value: u64) -> Self {
        Ratio {
            numerator: value,
            denominator: 1,
        }
    }

    fn reduced(numerator: u64, denominator: u64) -> Self {
        let divisor = gcd(numerator, denominator).max(1);
        Ratio {
            numerator: numerator / divisor,
            denominator: denominator / divisor,
        }
    }

    #[must_use]
    pub fn numerator(&self) -> u64 {
        self.numerator
    }

    #[must_use]
    pub fn denominator(&self) -> u64 {
        self.denominator
    }

    #[must_use]
    pub fn to_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Multiply by an integer factor (e.g. 100 to get a percentage value).
    #[must_use]
    pub fn times(&self, factor: u64) -> Ratio {
        let value = u128::from(self.numerator) * u128::from(factor);
        let divisor = u128::from(gcd(factor, self.denominator).max(1));
        Ratio {
            numerator: u64::try_from(value / divisor).unwrap_or(u64::MAX),
            denominator: self.denominator / divisor as u64,
        }
    }

    /// Render as a percentage truncated (never rounded up) to `precision`
    /// decimals, with trailing zeros dropped: 1/3 → "33.33%", 1/2 → "50%".
    #[must_use]
    pub fn pct(&self, precision: u32) -> String {
        let scale = 10u128.pow(precision);
        let scaled = u128::from(self.numerator) * 100 * scale / u128::from(self.denominator);
        let integer = scaled / scale;
        let fraction = scaled % scale;
        if fraction == 0 {
            return format!("{integer}%");
        }
        let digits = format!("{fraction:0width$}", width = precision as usize);
        format!("{integer}.{}%", digits.trim_end_matches('0'))
    }
}

impl PartialEq for Ratio {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ratio {}

impl PartialOrd for Ratio {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ratio {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = u128::from(self.numerator) * u128::from(other.denominator);
        let rhs = u128::from(other.numerator) * u128::from(self.denominator);
        lhs.cmp(&rhs)
    }
}

/// Parse a plain decimal such as "90", "87.5" or "0.01".
impl FromStr for Ratio {
    type Err = PrcovError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || PrcovError::Configuration(format!("'{s}' is not a valid decimal number"));
        let trimmed = s.trim();
        let (integer, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        if integer.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !integer.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let denominator = u32::try_from(fraction.len())
            .ok()
            .and_then(|exp| 10u64.checked_pow(exp))
            .ok_or_else(invalid)?;
        let digits = format!("{integer}{fraction}");
        let numerator = if digits.is_empty() {
            0
        } else {
            digits.parse::<u64>().map_err(|_| invalid())?
        };
        Ok(Ratio::reduced(numerator, denominator))
    }
}

/// Report-level metadata, set once at load.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageMetadata {
    pub version: String,
    pub timestamp: NaiveDateTime,
    pub branch_coverage: bool,
    pub show_contexts: bool,
}

/// Summary counters for a file or for the whole report. The branch counters
/// are only present when the report was collected with branch coverage.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageInfo {
    pub covered_lines: u32,
    pub num_statements: u32,
    pub percent_covered: Ratio,
    pub percent_covered_display: String,
    pub missing_lines: u32,
    pub excluded_lines: u32,
    pub num_branches: Option<u32>,
    pub num_partial_branches: Option<u32>,
    pub covered_branches: Option<u32>,
    pub missing_branches: Option<u32>,
}

impl CoverageInfo {
    /// Build line counters, deriving `percent_covered` from them.
    #[must_use]
    pub fn from_lines(covered_lines: u32, num_statements: u32, missing_lines: u32, excluded_lines: u32) -> Self {
        let percent_covered = compute_coverage(u64::from(covered_lines), u64::from(num_statements));
        Self {
            covered_lines,
            num_statements,
            percent_covered,
            percent_covered_display: percent_covered.pct(0).trim_end_matches('%').to_string(),
            missing_lines,
            excluded_lines,
            num_branches: None,
            num_partial_branches: None,
            covered_branches: None,
            missing_branches: None,
        }
    }
}

/// One endpoint of a branch arc. `synthetic` marks endpoints the report
/// encodes as negative line numbers (e.g. exits from a code object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchEndpoint {
    pub line: u32,
    pub synthetic: bool,
}

impl BranchEndpoint {
    #[must_use]
    pub fn line(line: u32) -> Self {
        Self {
            line,
            synthetic: false,
        }
    }

    /// Decode the report's signed representation.
    #[must_use]
    pub fn from_signed(value: i64) -> Option<Self> {
        let line = u32::try_from(value.unsigned_abs()).ok()?;
        Some(Self {
            line,
            synthetic: value < 0,
        })
    }
}

/// A `[from, to]` branch arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchPair {
    pub from: BranchEndpoint,
    pub to: BranchEndpoint,
}

impl BranchPair {
    #[must_use]
    pub fn new(from: BranchEndpoint, to: BranchEndpoint) -> Self {
        Self { from, to }
    }

    /// Pair of two plain (non-synthetic) lines.
    #[must_use]
    pub fn lines(from: u32, to: u32) -> Self {
        Self::new(BranchEndpoint::line(from), BranchEndpoint::line(to))
    }

    /// Inclusive line range spanned by the arc, lowest line first.
    #[must_use]
    pub fn span(&self) -> (u32, u32) {
        let (a, b) = (self.from.line, self.to.line);
        (a.min(b), a.max(b))
    }
}

/// Coverage data for a single source file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileCoverage {
    pub path: String,
    pub executed_lines: Vec<u32>,
    pub missing_lines: Vec<u32>,
    pub excluded_lines: Vec<u32>,
    pub executed_branches: Option<Vec<BranchPair>>,
    pub missing_branches: Option<Vec<BranchPair>>,
    pub info: CoverageInfo,
}

impl FileCoverage {
    /// Build a file entry from line lists, deriving its summary counters.
    #[must_use]
    pub fn new(path: String, executed_lines: Vec<u32>, missing_lines: Vec<u32>, excluded_lines: Vec<u32>) -> Self {
        let covered = executed_lines.len() as u32;
        let missing = missing_lines.len() as u32;
        let info = CoverageInfo::from_lines(covered, covered + missing, missing, excluded_lines.len() as u32);
        Self {
            path,
            executed_lines,
            missing_lines,
            excluded_lines,
            executed_branches: None,
            missing_branches: None,
            info,
        }
    }
}

/// The complete result of parsing a coverage report.
#[derive(Debug, Clone, PartialEq)]
pub struct Coverage {
    pub meta: CoverageMetadata,
    pub info: CoverageInfo,
    pub files: BTreeMap<String, FileCoverage>,
}

/// File path → sorted line numbers added by a diff.
pub type DiffAddedLines = BTreeMap<String, Vec<u32>>;

/// Per-file diff coverage detail.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDiffCoverage {
    pub path: String,
    pub percent_covered: Ratio,
    /// Added lines that are statements and were executed.
    pub covered_statements: Vec<u32>,
    /// Added lines that are statements and were NOT executed.
    pub missing_statements: Vec<u32>,
    /// `covered_statements ∪ missing_statements`.
    pub added_statements: Vec<u32>,
    /// Every added line, statements or not (blank lines, comments, ...).
    pub added_lines: Vec<u32>,
}

/// Diff coverage across all files of a diff.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffCoverage {
    pub total_num_lines: u64,
    pub total_num_violations: u64,
    pub total_percent_covered: Ratio,
    pub num_changed_lines: u64,
    pub files: BTreeMap<String, FileDiffCoverage>,
}

pub mod coveragepy;

use crate::error::{PrcovError, Result};
use crate::model::Coverage;

/// Every report parser implements this trait.
pub trait Parser {
    /// Parse the input bytes into our coverage model.
    fn parse(&self, input: &[u8]) -> Result<Coverage>;
}

/// Supported coverage report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// `coverage json` output of coverage.py (pytest-cov).
    #[default]
    CoveragePy,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::CoveragePy => "coveragepy",
        }
    }

    /// Dispatch to the parser for this format.
    pub fn parse(&self, input: &[u8]) -> Result<Coverage> {
        match self {
            Format::CoveragePy => coveragepy::CoveragePyParser.parse(input),
        }
    }
}

impl std::str::FromStr for Format {
    type Err = PrcovError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "coveragepy" | "coverage.py" | "pytest" => Ok(Format::CoveragePy),
            _ => Err(PrcovError::Configuration(format!(
                "Unknown format: '{}'. Supported: coveragepy",
                s
            ))),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_str() {
        assert_eq!("coveragepy".parse::<Format>().unwrap(), Format::CoveragePy);
        assert_eq!("Pytest".parse::<Format>().unwrap(), Format::CoveragePy);
        assert!("lcov".parse::<Format>().is_err());
        assert_eq!(Format::CoveragePy.to_string(), "coveragepy");
    }
}

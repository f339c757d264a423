use std::path::Path;

use tracing::{debug, error};

use crate::error::{PrcovError, Result};
use crate::model::Coverage;
use crate::parsers::Format;

/// Read a coverage.py JSON report from disk.
///
/// A missing file or a malformed report is a [`PrcovError::Configuration`]
/// error: bad input, not an internal failure.
pub fn load(file_path: &Path) -> Result<Coverage> {
    load_with_format(file_path, Format::CoveragePy)
}

/// Read a coverage report from disk and parse it with the given format.
pub fn load_with_format(file_path: &Path, format: Format) -> Result<Coverage> {
    let content = std::fs::read(file_path).map_err(|e| {
        error!(path = %file_path.display(), "coverage report file not found or unreadable");
        PrcovError::Configuration(format!(
            "cannot read coverage report {}: {e}",
            file_path.display()
        ))
    })?;

    let coverage = format.parse(&content).map_err(|e| {
        error!(path = %file_path.display(), %format, "invalid coverage report");
        PrcovError::Configuration(format!(
            "invalid coverage report {}: {e}",
            file_path.display()
        ))
    })?;

    debug!(
        path = %file_path.display(),
        files = coverage.files.len(),
        statements = coverage.info.num_statements,
        "loaded coverage report"
    );
    Ok(coverage)
}

//! Intersect the lines added by a diff with a coverage report.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{compute_coverage, Coverage, DiffAddedLines, DiffCoverage, FileDiffCoverage};

/// Compute per-file and overall coverage of the statements added by a diff.
///
/// Every added line counts toward `num_changed_lines`, even in files the
/// report doesn't know about (non-code files, generated files, ...). Only
/// files present in the report contribute statements and violations.
#[must_use]
pub fn diff_coverage(added_lines: &DiffAddedLines, coverage: &Coverage) -> DiffCoverage {
    let mut files = BTreeMap::new();
    let mut total_num_lines: u64 = 0;
    let mut total_num_violations: u64 = 0;
    let mut num_changed_lines: u64 = 0;

    for (path, added_lines_for_file) in added_lines {
        num_changed_lines += added_lines_for_file.len() as u64;

        let Some(file) = coverage.files.get(path) else {
            continue;
        };

        let added: BTreeSet<u32> = added_lines_for_file.iter().copied().collect();
        let executed: BTreeSet<u32> = file
            .executed_lines
            .iter()
            .copied()
            .filter(|line| added.contains(line))
            .collect();
        let missing: BTreeSet<u32> = file
            .missing_lines
            .iter()
            .copied()
            .filter(|line| added.contains(line))
            .collect();
        let added_statements: Vec<u32> = executed.union(&missing).copied().collect();

        total_num_lines += added_statements.len() as u64;
        total_num_violations += missing.len() as u64;

        files.insert(
            path.clone(),
            FileDiffCoverage {
                path: path.clone(),
                percent_covered: compute_coverage(executed.len() as u64, added_statements.len() as u64),
                covered_statements: executed.into_iter().collect(),
                missing_statements: missing.into_iter().collect(),
                added_statements,
                added_lines: added_lines_for_file.clone(),
            },
        );
    }

    DiffCoverage {
        total_num_lines,
        total_num_violations,
        total_percent_covered: compute_coverage(total_num_lines - total_num_violations, total_num_lines),
        num_changed_lines,
        files,
    }
}

//! Group scattered missing lines into contiguous annotation ranges.
//!
//! A gap between two runs of missing lines is bridged when it is small and
//! holds nothing but "joiner" lines (blank lines, comments, lines the diff
//! touched...). A "separator" in the gap (a covered or excluded statement)
//! always splits the two runs.

use std::collections::BTreeSet;

use crate::model::{BranchPair, Coverage, DiffCoverage, FileCoverage};

/// Largest number of non-joiner lines a gap may hold and still be bridged.
pub const MAX_ANNOTATION_GAP: usize = 3;

/// An inclusive line range in one file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Group {
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
}

impl Group {
    pub fn new(file: impl Into<String>, line_start: u32, line_end: u32) -> Self {
        Self {
            file: file.into(),
            line_start,
            line_end,
        }
    }
}

/// Collapse sorted `values` into inclusive `(start, end)` ranges.
///
/// Consecutive values form a run. Two neighbouring runs merge when the lines
/// strictly between them, minus `joiners`, number at most `max_gap` and
/// include no line of `separators`.
pub fn compute_contiguous_groups(
    values: &[u32],
    separators: &BTreeSet<u32>,
    joiners: &BTreeSet<u32>,
    max_gap: usize,
) -> Vec<(u32, u32)> {
    let mut groups: Vec<(u32, u32)> = Vec::new();

    for (start, end) in runs(values) {
        if let Some(last) = groups.last_mut() {
            let mut gap = (last.1 + 1..start).filter(|line| !joiners.contains(line));
            let mut size = 0;
            let bridgeable = gap.all(|line| {
                size += 1;
                size <= max_gap && !separators.contains(&line)
            });
            if bridgeable {
                last.1 = end;
                continue;
            }
        }
        groups.push((start, end));
    }

    groups
}

/// Maximal runs of consecutive integers, in order.
fn runs(values: &[u32]) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for &value in values {
        match runs.last_mut() {
            Some(run) if run.1.checked_add(1) == Some(value) => run.1 = value,
            Some(run) if run.1 == value => {}
            _ => runs.push((value, value)),
        }
    }
    runs
}

/// Expand each branch arc into the lines it spans, sorted and deduplicated.
pub fn flatten_branches(branches: Option<&[BranchPair]>) -> Vec<u32> {
    let lines: BTreeSet<u32> = branches
        .unwrap_or_default()
        .iter()
        .flat_map(|pair| {
            let (start, end) = pair.span();
            start..=end
        })
        .collect();
    lines.into_iter().collect()
}

fn separators(file: &FileCoverage) -> BTreeSet<u32> {
    file.executed_lines
        .iter()
        .chain(&file.excluded_lines)
        .copied()
        .collect()
}

/// Every statement line number of the file that is not a separator.
fn statement_joiners(file: &FileCoverage, separators: &BTreeSet<u32>) -> BTreeSet<u32> {
    (1..=file.info.num_statements)
        .filter(|line| !separators.contains(line))
        .collect()
}

fn to_groups(path: &str, ranges: Vec<(u32, u32)>) -> impl Iterator<Item = Group> + '_ {
    ranges
        .into_iter()
        .map(move |(start, end)| Group::new(path, start, end))
}

/// Missing-line groups over the whole project.
pub fn missing_groups(coverage: &Coverage) -> Vec<Group> {
    coverage
        .files
        .iter()
        .flat_map(|(path, file)| {
            let separators = separators(file);
            let joiners = statement_joiners(file, &separators);
            let ranges =
                compute_contiguous_groups(&file.missing_lines, &separators, &joiners, MAX_ANNOTATION_GAP);
            to_groups(path, ranges)
        })
        .collect()
}

/// Missing-line groups restricted to the statements a diff added. Only lines
/// the diff touched may be bridged.
pub fn diff_missing_groups(coverage: &Coverage, diff_coverage: &DiffCoverage) -> Vec<Group> {
    diff_coverage
        .files
        .iter()
        .filter_map(|(path, diff_file)| Some((path, diff_file, coverage.files.get(path)?)))
        .flat_map(|(path, diff_file, file)| {
            let separators = separators(file);
            let joiners: BTreeSet<u32> = diff_file
                .added_lines
                .iter()
                .copied()
                .filter(|line| !separators.contains(line))
                .collect();
            let ranges = compute_contiguous_groups(
                &diff_file.missing_statements,
                &separators,
                &joiners,
                MAX_ANNOTATION_GAP,
            );
            to_groups(path, ranges)
        })
        .collect()
}

/// Return a copy of `coverage` whose missing branches are merged into
/// contiguous ranges, one plain `[start, end]` arc per range.
pub fn fill_branch_missing_groups(coverage: &Coverage) -> Coverage {
    let mut filled = coverage.clone();
    for file in filled.files.values_mut() {
        let Some(missing) = file.missing_branches.as_deref() else {
            continue;
        };
        let values = flatten_branches(Some(missing));
        let separators: BTreeSet<u32> = flatten_branches(file.executed_branches.as_deref())
            .into_iter()
            .collect();
        let joiners = statement_joiners(file, &separators);
        let ranges = compute_contiguous_groups(&values, &separators, &joiners, MAX_ANNOTATION_GAP);
        file.missing_branches = Some(
            ranges
                .into_iter()
                .map(|(start, end)| BranchPair::lines(start, end))
                .collect(),
        );
    }
    filled
}

/// One group per missing branch arc of every file in the diff coverage.
pub fn diff_branch_missing_groups(coverage: &Coverage, diff_coverage: &DiffCoverage) -> Vec<Group> {
    diff_coverage
        .files
        .keys()
        .filter_map(|path| Some((path, coverage.files.get(path)?.missing_branches.as_deref()?)))
        .flat_map(|(path, missing)| {
            missing.iter().map(move |pair| {
                let (start, end) = pair.span();
                Group::new(path.as_str(), start, end)
            })
        })
        .collect()
}

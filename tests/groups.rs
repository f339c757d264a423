mod common;

use std::collections::BTreeMap;

use common::{make_coverage, CODE, OTHER};
use prcov::annotation::{missing_coverage_annotations, AnnotationType};
use prcov::diff_coverage::diff_coverage;
use prcov::groups::{
    diff_branch_missing_groups, diff_missing_groups, fill_branch_missing_groups, missing_groups, Group,
};
use prcov::model::{BranchPair, DiffAddedLines};

fn both_files() -> String {
    format!("{CODE}\n{OTHER}")
}

fn added_lines() -> DiffAddedLines {
    BTreeMap::from([
        ("codebase/code.py".to_string(), vec![3, 4, 5, 6, 7, 8, 9, 12]),
        ("codebase/other.py".to_string(), vec![1, 2, 3, 4, 5, 6, 7, 8, 17]),
    ])
}

#[test]
fn missing_groups_whole_project() {
    let coverage = make_coverage(&both_files());
    assert_eq!(
        missing_groups(&coverage),
        vec![
            Group::new("codebase/code.py", 6, 11),
            Group::new("codebase/other.py", 2, 2),
            Group::new("codebase/other.py", 6, 9),
        ]
    );
}

#[test]
fn diff_missing_groups_only_bridge_added_lines() {
    let coverage = make_coverage(&both_files());
    let diff = diff_coverage(&added_lines(), &coverage);

    assert_eq!(diff.files["codebase/code.py"].missing_statements, vec![6, 8]);
    assert_eq!(
        diff_missing_groups(&coverage, &diff),
        vec![
            Group::new("codebase/code.py", 6, 8),
            Group::new("codebase/other.py", 2, 2),
            Group::new("codebase/other.py", 6, 7),
        ]
    );
}

#[test]
fn diff_missing_groups_ignores_files_outside_report() {
    let coverage = make_coverage(CODE);
    let mut added = added_lines();
    added.insert("README.md".to_string(), vec![1, 2]);
    let diff = diff_coverage(&added, &coverage);

    let groups = diff_missing_groups(&coverage, &diff);
    assert_eq!(groups, vec![Group::new("codebase/code.py", 6, 8)]);
}

#[test]
fn fill_branch_missing_groups_merges_arcs() {
    let coverage = make_coverage(&both_files());
    let filled = fill_branch_missing_groups(&coverage);

    assert_eq!(
        filled.files["codebase/code.py"].missing_branches,
        Some(vec![BranchPair::lines(5, 11)])
    );
    assert_eq!(
        filled.files["codebase/other.py"].missing_branches,
        Some(vec![BranchPair::lines(3, 11)])
    );
    // The input is left untouched.
    assert_eq!(
        coverage.files["codebase/code.py"].missing_branches,
        Some(vec![BranchPair::lines(5, 6), BranchPair::lines(10, 11)])
    );
}

#[test]
fn diff_branch_missing_groups_one_per_arc() {
    let coverage = make_coverage(&both_files());
    let diff = diff_coverage(&added_lines(), &coverage);

    assert_eq!(
        diff_branch_missing_groups(&coverage, &diff),
        vec![
            Group::new("codebase/code.py", 5, 6),
            Group::new("codebase/code.py", 10, 11),
            Group::new("codebase/other.py", 3, 4),
            Group::new("codebase/other.py", 5, 6),
            Group::new("codebase/other.py", 10, 11),
        ]
    );
}

#[test]
fn diff_branch_missing_groups_after_fill() {
    let coverage = fill_branch_missing_groups(&make_coverage(&both_files()));
    let added = BTreeMap::from([("codebase/code.py".to_string(), vec![5])]);
    let diff = diff_coverage(&added, &coverage);

    assert_eq!(
        diff_branch_missing_groups(&coverage, &diff),
        vec![Group::new("codebase/code.py", 5, 11)]
    );
}

#[test]
fn groups_to_annotations() {
    let coverage = make_coverage(&both_files());
    let diff = diff_coverage(&added_lines(), &coverage);

    let annotations =
        missing_coverage_annotations(AnnotationType::Error, &diff_missing_groups(&coverage, &diff), false);
    let rendered: Vec<String> = annotations.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        vec![
            "ERROR Missing coverage on lines 6-8 in codebase/code.py:6-8",
            "ERROR Missing coverage on line 2 in codebase/other.py:2-2",
            "ERROR Missing coverage on lines 6-7 in codebase/other.py:6-7",
        ]
    );
}

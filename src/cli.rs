//! Command handler functions for the prcov CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use tracing::info;

use crate::annotation::{self, Annotation, AnnotationType};
use crate::config::Config;
use crate::diff::{self, DiffSource, FileDiff, GitDiff, StdinDiff};
use crate::diff_coverage::diff_coverage;
use crate::github::{GitHubClient, PullRequestDiff, Transport};
use crate::groups;
use crate::ingest;
use crate::model::{Coverage, DiffAddedLines, DiffCoverage};
use crate::report::{
    DiffCoverageReport, MarkdownFormatter, PullRequestLinks, ReportFormatter, ReportOptions, TextFormatter,
};

/// Output style for the `diff-coverage` command.
#[derive(Clone, Copy, ValueEnum)]
pub enum Style {
    Text,
    Markdown,
}

/// Pick where the diff comes from: `git diff <args>`, a saved diff file, or
/// stdin when neither is given.
pub fn diff_source(git_diff: Option<String>, diff_file: Option<PathBuf>) -> Box<dyn DiffSource> {
    match (git_diff, diff_file) {
        (Some(args), _) => Box::new(GitDiff { args }),
        (None, Some(path)) => Box::new(FileDiff { path }),
        (None, None) => Box::new(StdinDiff),
    }
}

/// Fetch and parse a diff, optionally prefixing its paths so they match the
/// paths of the coverage report.
pub fn load_diff(source: &dyn DiffSource, path_prefix: Option<&str>) -> Result<DiffAddedLines> {
    let text = source.fetch_diff().context("Failed to get diff")?;
    let added_lines = diff::parse_diff(&text).context("Failed to parse diff")?;
    Ok(match path_prefix {
        Some(prefix) => diff::apply_path_prefix(added_lines, prefix),
        None => added_lines,
    })
}

/// Annotations for the missing lines added by the diff, followed by the
/// missing branches when `branch` is set.
pub fn build_annotations(
    coverage: &Coverage,
    diff_coverage: &DiffCoverage,
    annotation_type: AnnotationType,
    branch: bool,
) -> Vec<Annotation> {
    let mut annotations = annotation::missing_coverage_annotations(
        annotation_type,
        &groups::diff_missing_groups(coverage, diff_coverage),
        false,
    );
    if branch {
        annotations.extend(annotation::missing_coverage_annotations(
            annotation_type,
            &groups::diff_branch_missing_groups(coverage, diff_coverage),
            true,
        ));
    }
    annotations
}

fn load_coverage(path: &Path, branch: bool) -> Result<Coverage> {
    let coverage = ingest::load(path).context("Failed to load coverage report")?;
    Ok(if branch {
        groups::fill_branch_missing_groups(&coverage)
    } else {
        coverage
    })
}

pub fn cmd_diff_coverage(
    coverage_path: &Path,
    source: &dyn DiffSource,
    path_prefix: Option<&str>,
    style: Style,
) -> Result<String> {
    let coverage = load_coverage(coverage_path, false)?;
    let added_lines = load_diff(source, path_prefix)?;
    let diff = diff_coverage(&added_lines, &coverage);

    let report = DiffCoverageReport {
        coverage: &coverage,
        diff_coverage: &diff,
        options: ReportOptions::default(),
        links: None,
    };
    let formatter: &dyn ReportFormatter = match style {
        Style::Text => &TextFormatter,
        Style::Markdown => &MarkdownFormatter,
    };
    Ok(report.format(formatter)?)
}

/// Options of the `annotate` command.
pub struct AnnotateOptions<'a> {
    pub path_prefix: Option<&'a str>,
    pub annotation_type: AnnotationType,
    pub branch: bool,
    /// Directory to write `<pr>-annotations.json` into.
    pub output: Option<&'a Path>,
    pub pr_number: Option<u64>,
}

/// Print the annotations as a JSON array, and write them to a file when
/// an output directory is given.
pub fn cmd_annotate(coverage_path: &Path, source: &dyn DiffSource, options: &AnnotateOptions<'_>) -> Result<String> {
    let coverage = load_coverage(coverage_path, options.branch)?;
    let added_lines = load_diff(source, options.path_prefix)?;
    let diff = diff_coverage(&added_lines, &coverage);
    let annotations = build_annotations(&coverage, &diff, options.annotation_type, options.branch);

    if let Some(dir) = options.output {
        let Some(pr_number) = options.pr_number else {
            bail!("--pr-number is required to name the annotations file");
        };
        let path = annotation::write_annotations(dir, pr_number, &annotations)
            .with_context(|| format!("Failed to write annotations to {}", dir.display()))?;
        info!("Wrote {} annotations to {}", annotations.len(), path.display());
    }

    let mut out = Annotation::to_json(&annotations)?;
    out.push('\n');
    Ok(out)
}

/// The whole pull request workflow: comment on the PR with the coverage
/// report, then produce annotations for the new missing lines.
pub fn cmd_run<T: Transport>(config: &Config, client: &GitHubClient<T>) -> Result<String> {
    if config.skip_coverage && !config.annotate_missing_lines {
        bail!(
            "No action taken as both SKIP_COVERAGE and ANNOTATE_MISSING_LINES are set to False. \
             No comments or annotations will be generated."
        );
    }

    let pr_number = client
        .get_pr_number(config.github_pr_number, config.github_ref.as_deref())
        .context("Cannot determine the pull request")?;

    info!("Processing coverage data");
    let coverage = load_coverage(&config.coverage_path, config.branch_coverage)
        .context("Error parsing the coverage file. Please check the file and try again.")?;
    let added_lines = load_diff(&PullRequestDiff { client, pr_number }, None)?;
    let diff = diff_coverage(&added_lines, &coverage);

    let mut user = None;
    if config.skip_coverage {
        info!("Skipping coverage report generation.");
    } else {
        info!("Generating comment for PR #{pr_number}");
        let report = DiffCoverageReport {
            coverage: &coverage,
            diff_coverage: &diff,
            options: ReportOptions {
                minimum_green: config.minimum_green,
                minimum_orange: config.minimum_orange,
                max_files: Some(config.max_files_in_comment),
                subproject_id: config.subproject_id.clone(),
                branch_coverage: config.branch_coverage,
                complete_project_report: config.complete_project_report,
                skip_covered_files: config.skip_covered_files_in_report,
                coverage_report_url: config.coverage_report_url.clone(),
            },
            links: Some(PullRequestLinks {
                repository: config.github_repository.clone(),
                pr_number,
                base_ref: config.github_base_ref.clone(),
            }),
        };
        let comment = report.comment().context("Cannot render the coverage comment")?;
        let me = client.get_my_login().context("Cannot identify the GitHub user")?;
        client
            .post_comment(&me, pr_number, &comment, &report.marker())
            .context("Cannot post the coverage comment")?;
        info!("Comment created on PR.");
        user = Some(me);
    }

    let mut out = String::new();
    if !config.annotate_missing_lines {
        info!("Skipping annotations generation.");
        return Ok(out);
    }

    info!("Generating annotations for missing lines.");
    let annotations = build_annotations(&coverage, &diff, config.annotation_type, config.branch_coverage);
    if annotations.is_empty() {
        info!("No annotations to generate. Exiting.");
        return Ok(out);
    }
    for annotation in &annotations {
        writeln!(out, "{annotation}")?;
    }

    if let Some(dir) = &config.annotations_output_path {
        let path = annotation::write_annotations(dir, pr_number, &annotations)
            .with_context(|| format!("Failed to write annotations to {}", dir.display()))?;
        info!("Wrote annotations to file {}", path.display());
    }

    if let Some(branch) = &config.annotations_data_branch {
        let user = match user {
            Some(user) => user,
            None => client.get_my_login().context("Cannot identify the GitHub user")?,
        };
        client
            .write_annotations_to_branch(&user, pr_number, branch, &annotations)
            .context("Cannot write annotations to the data branch")?;
    }
    info!("Annotations generated.");

    Ok(out)
}

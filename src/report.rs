//! Output formatting for diff coverage results: the pull request comment
//! and the plain text summary of the CLI.

use std::collections::BTreeMap;
use std::fmt::Write;

use sha2::{Digest, Sha256};

use crate::badge;
use crate::error::{PrcovError, Result};
use crate::groups::{self, Group};
use crate::model::{Coverage, DiffCoverage, FileCoverage, FileDiffCoverage, Ratio};

/// Hidden HTML marker identifying our comment among the others of a PR.
#[must_use]
pub fn get_marker(subproject_id: Option<&str>) -> String {
    match subproject_id {
        Some(id) => format!("<!-- This comment was generated by prcov (id: {id}) -->"),
        None => "<!-- This comment was generated by prcov -->".to_string(),
    }
}

#[must_use]
pub fn pluralize<'a>(count: usize, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 {
        singular
    } else {
        plural
    }
}

/// Knobs of the rendered report.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Percentages at or above which the badge turns green / orange.
    pub minimum_green: Ratio,
    pub minimum_orange: Ratio,
    /// Maximum number of file rows, shared by the changed files and the
    /// complete project tables. `None` means no limit.
    pub max_files: Option<usize>,
    pub subproject_id: Option<String>,
    pub branch_coverage: bool,
    pub complete_project_report: bool,
    pub skip_covered_files: bool,
    pub coverage_report_url: Option<String>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            minimum_green: Ratio::from_integer(100),
            minimum_orange: Ratio::from_integer(70),
            max_files: Some(25),
            subproject_id: None,
            branch_coverage: false,
            complete_project_report: false,
            skip_covered_files: false,
            coverage_report_url: None,
        }
    }
}

/// Where the pull request lives, to link files and line ranges.
#[derive(Debug, Clone)]
pub struct PullRequestLinks {
    pub repository: String,
    pub pr_number: u64,
    pub base_ref: String,
}

impl PullRequestLinks {
    /// Link to a file in the "Files changed" tab of the PR. GitHub anchors
    /// each file by the SHA-256 of its path; `R` refers to the new side.
    #[must_use]
    pub fn file_url(&self, path: &str, lines: Option<(u32, u32)>) -> String {
        let digest = hex::encode(Sha256::digest(path.as_bytes()));
        let mut url = format!(
            "https://github.com/{}/pull/{}/files#diff-{digest}",
            self.repository, self.pr_number
        );
        if let Some((start, end)) = lines {
            let _ = write!(url, "R{start}-R{end}");
        }
        url
    }

    /// Link to a file on the base branch.
    #[must_use]
    pub fn base_file_url(&self, path: &str, lines: Option<(u32, u32)>) -> String {
        let mut url = format!(
            "https://github.com/{}/blob/{}/{path}",
            self.repository, self.base_ref
        );
        if let Some((start, end)) = lines {
            let _ = write!(url, "#L{start}-L{end}");
        }
        url
    }
}

/// A file row of the report.
#[derive(Debug, Clone, Copy)]
pub struct FileInfo<'a> {
    pub path: &'a str,
    pub coverage: &'a FileCoverage,
    pub diff: Option<&'a FileDiffCoverage>,
}

impl FileInfo<'_> {
    fn sort_key(&self) -> (usize, usize, usize) {
        (
            self.coverage.missing_lines.len(),
            self.diff.map_or(0, |d| d.added_statements.len()),
            self.coverage.executed_lines.len(),
        )
    }
}

/// Files of the report that the diff added statements to, keeping the
/// `max_files` with the most missing lines. Returns the kept files, sorted
/// by path, and the number of candidates before truncation.
pub fn select_changed_files<'a>(
    coverage: &'a Coverage,
    diff_coverage: &'a DiffCoverage,
    max_files: Option<usize>,
    skip_covered_files: bool,
) -> (Vec<FileInfo<'a>>, usize) {
    let files: Vec<FileInfo<'a>> = coverage
        .files
        .iter()
        .filter_map(|(path, file)| {
            let diff = diff_coverage.files.get(path)?;
            if diff.added_statements.is_empty() {
                return None;
            }
            if skip_covered_files && diff.percent_covered == Ratio::ONE {
                return None;
            }
            Some(FileInfo {
                path,
                coverage: file,
                diff: Some(diff),
            })
        })
        .collect();
    let count = files.len();
    (sort_and_truncate(files, max_files), count)
}

/// Files of the report the diff didn't touch that hold statements.
pub fn select_files<'a>(
    coverage: &'a Coverage,
    changed_files: &[FileInfo<'_>],
    max_files: Option<usize>,
    skip_covered_files: bool,
) -> (Vec<FileInfo<'a>>, usize) {
    let files: Vec<FileInfo<'a>> = coverage
        .files
        .iter()
        .filter(|(path, file)| {
            !changed_files.iter().any(|changed| changed.path == path.as_str())
                && file.info.num_statements > 0
                && !(skip_covered_files && file.info.percent_covered == Ratio::ONE)
        })
        .map(|(path, file)| FileInfo {
            path,
            coverage: file,
            diff: None,
        })
        .collect();
    let count = files.len();
    (sort_and_truncate(files, max_files), count)
}

fn sort_and_truncate(mut files: Vec<FileInfo<'_>>, max_files: Option<usize>) -> Vec<FileInfo<'_>> {
    files.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    if let Some(max) = max_files {
        files.truncate(max);
    }
    files.sort_by(|a, b| a.path.cmp(b.path));
    files
}

/// Aggregated coverage data, ready to be formatted.
pub struct DiffCoverageReport<'a> {
    pub coverage: &'a Coverage,
    pub diff_coverage: &'a DiffCoverage,
    pub options: ReportOptions,
    /// Links are only rendered when the report targets a pull request.
    pub links: Option<PullRequestLinks>,
}

impl DiffCoverageReport<'_> {
    /// Format using a specific formatter.
    pub fn format(&self, formatter: &dyn ReportFormatter) -> Result<String> {
        formatter.format(self)
    }

    #[must_use]
    pub fn marker(&self) -> String {
        get_marker(self.options.subproject_id.as_deref())
    }

    /// Render the pull request comment. The marker must survive rendering,
    /// otherwise the next run could not find the comment to update.
    pub fn comment(&self) -> Result<String> {
        let body = self.format(&MarkdownFormatter)?;
        if !body.contains(&self.marker()) {
            return Err(PrcovError::MissingMarker);
        }
        Ok(body)
    }
}

/// Trait for formatting diff coverage reports.
pub trait ReportFormatter {
    /// Format the report to a string.
    fn format(&self, report: &DiffCoverageReport<'_>) -> Result<String>;
}

/// Plain text formatter.
pub struct TextFormatter;

impl ReportFormatter for TextFormatter {
    fn format(&self, report: &DiffCoverageReport<'_>) -> Result<String> {
        let mut out = String::new();
        let diff = report.diff_coverage;

        if diff.num_changed_lines == 0 {
            out.push_str("No added lines found in diff.\n");
            return Ok(out);
        }

        if diff.total_num_lines == 0 {
            let lines = diff.num_changed_lines;
            writeln!(
                out,
                "{lines} {} added, none of them are statements.",
                pluralize(lines as usize, "line", "lines")
            )?;
            return Ok(out);
        }

        let covered = diff.total_num_lines - diff.total_num_violations;
        writeln!(
            out,
            "Diff coverage: {} ({covered}/{} statements covered)",
            diff.total_percent_covered.pct(2),
            diff.total_num_lines
        )?;

        let missing = missing_by_file(groups::diff_missing_groups(report.coverage, diff));
        let mut files_with_misses: Vec<&FileDiffCoverage> = diff
            .files
            .values()
            .filter(|f| !f.missing_statements.is_empty())
            .collect();
        files_with_misses.sort_by(|a, b| a.percent_covered.cmp(&b.percent_covered));

        if !files_with_misses.is_empty() {
            out.push('\n');
            for f in files_with_misses {
                let ranges = missing
                    .get(f.path.as_str())
                    .map(|groups| plain_ranges(groups))
                    .unwrap_or_default();
                writeln!(
                    out,
                    "  {}  {}/{} ({})  missed: {ranges}",
                    f.path,
                    f.covered_statements.len(),
                    f.added_statements.len(),
                    f.percent_covered.pct(2),
                )?;
            }
        }

        out.push('\n');
        writeln!(
            out,
            "Full project coverage: {}",
            report.coverage.info.percent_covered.pct(2)
        )?;

        Ok(out)
    }
}

/// Markdown formatter, used for the pull request comment.
pub struct MarkdownFormatter;

impl MarkdownFormatter {
    fn badge(&self, report: &DiffCoverageReport<'_>, label: &str, rate: Ratio) -> Result<String> {
        let color = badge::badge_color(rate, report.options.minimum_green, report.options.minimum_orange);
        badge::static_badge_url(label, &rate.pct(2), color)
            .map_err(|e| PrcovError::Template(format!("cannot render badge: {e}")))
    }

    fn file_link(&self, report: &DiffCoverageReport<'_>, path: &str, changed: bool) -> String {
        match &report.links {
            Some(links) if changed => format!("[`{path}`]({})", links.file_url(path, None)),
            Some(links) => format!("[`{path}`]({})", links.base_file_url(path, None)),
            None => format!("`{path}`"),
        }
    }

    fn ranges(&self, report: &DiffCoverageReport<'_>, groups: &[Group], changed: bool) -> String {
        groups
            .iter()
            .map(|group| {
                let text = range_text(group);
                let lines = Some((group.line_start, group.line_end));
                match &report.links {
                    Some(links) if changed => format!("[{text}]({})", links.file_url(&group.file, lines)),
                    Some(links) => format!("[{text}]({})", links.base_file_url(&group.file, lines)),
                    None => text,
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn branch_cell(file: &FileCoverage) -> String {
        match (file.info.covered_branches, file.info.num_branches) {
            (Some(covered), Some(total)) => format!("{covered}/{total}"),
            _ => "-".to_string(),
        }
    }
}

impl ReportFormatter for MarkdownFormatter {
    fn format(&self, report: &DiffCoverageReport<'_>) -> Result<String> {
        let options = &report.options;
        let coverage = report.coverage;
        let diff = report.diff_coverage;
        let mut md = String::new();

        match &options.subproject_id {
            Some(id) => writeln!(md, "## Coverage report ({id})\n")?,
            None => writeln!(md, "## Coverage report\n")?,
        }

        let project_badge = self.badge(report, "Coverage", coverage.info.percent_covered)?;
        let diff_badge = self.badge(report, "Diff coverage", diff.total_percent_covered)?;
        match &options.coverage_report_url {
            Some(url) => write!(md, "[![Coverage]({project_badge})]({url})")?,
            None => write!(md, "![Coverage]({project_badge})")?,
        }
        writeln!(md, " ![Diff coverage]({diff_badge})\n")?;

        let (files, count_files) =
            select_changed_files(coverage, diff, options.max_files, options.skip_covered_files);
        let remaining = options.max_files.map(|max| max.saturating_sub(files.len()));

        if files.is_empty() {
            md.push_str("_This PR does not seem to contain any modification to coverable code._\n");
        } else {
            let missing = missing_by_file(groups::diff_missing_groups(coverage, diff));
            let violations = diff.total_num_violations;
            writeln!(
                md,
                "**{}** of new statements covered, **{violations}** new missing {}.\n",
                diff.total_percent_covered.pct(2),
                pluralize(violations as usize, "statement", "statements"),
            )?;

            self.table_header(&mut md, options.branch_coverage, "Coverage<br>(new stmts)")?;
            for file in &files {
                let groups = missing.get(file.path).map(Vec::as_slice).unwrap_or_default();
                let diff_cell = file.diff.map_or_else(|| "-".to_string(), |d| d.percent_covered.pct(2));
                self.table_row(
                    &mut md,
                    report,
                    file,
                    &diff_cell,
                    &self.ranges(report, groups, true),
                    true,
                )?;
            }
            if count_files > files.len() {
                let hidden = count_files - files.len();
                writeln!(
                    md,
                    "\n_{hidden} {} not shown, see the complete report for details._",
                    pluralize(hidden, "file", "files")
                )?;
            }
            md.push('\n');
        }

        if options.complete_project_report {
            let (project_files, count_project_files) =
                select_files(coverage, &files, remaining, options.skip_covered_files);
            if !project_files.is_empty() {
                let missing = missing_by_file(groups::missing_groups(coverage));
                writeln!(
                    md,
                    "<details><summary>Coverage of the {count_project_files} {} outside the diff</summary>\n",
                    pluralize(count_project_files, "file", "files")
                )?;
                self.table_header(&mut md, options.branch_coverage, "")?;
                for file in &project_files {
                    let groups = missing.get(file.path).map(Vec::as_slice).unwrap_or_default();
                    self.table_row(&mut md, report, file, "", &self.ranges(report, groups, false), false)?;
                }
                md.push_str("\n</details>\n\n");
            }
        }

        let info = &coverage.info;
        write!(
            md,
            "**Project total**: {} ({}/{} statements",
            info.percent_covered.pct(2),
            info.covered_lines,
            info.num_statements
        )?;
        if options.branch_coverage {
            if let (Some(covered), Some(total)) = (info.covered_branches, info.num_branches) {
                write!(md, ", {covered}/{total} branches")?;
            }
        }
        md.push_str(")\n\n");

        writeln!(md, "<sub>Generated by prcov</sub>")?;
        writeln!(md, "{}", report.marker())?;

        Ok(md)
    }
}

impl MarkdownFormatter {
    fn table_header(&self, md: &mut String, branch_coverage: bool, diff_column: &str) -> Result<()> {
        md.push_str("| File | Statements | Missing | Coverage |");
        if !diff_column.is_empty() {
            write!(md, " {diff_column} |")?;
        }
        if branch_coverage {
            md.push_str(" Branches |");
        }
        md.push_str(" Lines missing |\n");

        md.push_str("|:-----|-----------:|--------:|---------:|");
        if !diff_column.is_empty() {
            md.push_str("-----------:|");
        }
        if branch_coverage {
            md.push_str("---------:|");
        }
        md.push_str(":--------------|\n");
        Ok(())
    }

    fn table_row(
        &self,
        md: &mut String,
        report: &DiffCoverageReport<'_>,
        file: &FileInfo<'_>,
        diff_cell: &str,
        ranges: &str,
        changed: bool,
    ) -> Result<()> {
        let info = &file.coverage.info;
        write!(
            md,
            "| {} | {} | {} | {} |",
            self.file_link(report, file.path, changed),
            info.num_statements,
            info.missing_lines,
            info.percent_covered.pct(2),
        )?;
        if changed {
            write!(md, " {diff_cell} |")?;
        }
        if report.options.branch_coverage {
            write!(md, " {} |", Self::branch_cell(file.coverage))?;
        }
        writeln!(md, " {ranges} |")?;
        Ok(())
    }
}

fn missing_by_file(groups: Vec<Group>) -> BTreeMap<String, Vec<Group>> {
    let mut by_file: BTreeMap<String, Vec<Group>> = BTreeMap::new();
    for group in groups {
        by_file.entry(group.file.clone()).or_default().push(group);
    }
    by_file
}

fn range_text(group: &Group) -> String {
    if group.line_start == group.line_end {
        group.line_start.to_string()
    } else {
        format!("{}-{}", group.line_start, group.line_end)
    }
}

/// Format groups into compact range notation, e.g. "1, 3-5, 8".
#[must_use]
pub fn plain_ranges(groups: &[Group]) -> String {
    groups.iter().map(range_text).collect::<Vec<_>>().join(", ")
}

//! Configuration of the `run` command, read from environment variables as
//! provided by a GitHub Actions workflow.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::annotation::AnnotationType;
use crate::error::{PrcovError, Result};
use crate::model::Ratio;

const REQUIRED: [&str; 3] = ["GITHUB_REPOSITORY", "COVERAGE_PATH", "GITHUB_TOKEN"];

#[derive(Clone, PartialEq)]
pub struct Config {
    pub github_repository: String,
    pub coverage_path: PathBuf,
    pub github_token: String,
    pub github_pr_number: Option<u64>,
    /// Head branch of the PR, used to find it when no number is given.
    pub github_ref: Option<String>,
    pub github_base_ref: String,
    pub subproject_id: Option<String>,
    pub minimum_green: Ratio,
    pub minimum_orange: Ratio,
    pub branch_coverage: bool,
    pub skip_coverage: bool,
    pub annotate_missing_lines: bool,
    pub annotation_type: AnnotationType,
    pub annotations_output_path: Option<PathBuf>,
    pub annotations_data_branch: Option<String>,
    pub max_files_in_comment: usize,
    pub complete_project_report: bool,
    pub skip_covered_files_in_report: bool,
    pub coverage_report_url: Option<String>,
    pub debug: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("github_repository", &self.github_repository)
            .field("coverage_path", &self.coverage_path)
            .field("github_token", &"<redacted>")
            .field("github_pr_number", &self.github_pr_number)
            .field("github_ref", &self.github_ref)
            .field("github_base_ref", &self.github_base_ref)
            .field("subproject_id", &self.subproject_id)
            .field("minimum_green", &self.minimum_green)
            .field("minimum_orange", &self.minimum_orange)
            .field("branch_coverage", &self.branch_coverage)
            .field("skip_coverage", &self.skip_coverage)
            .field("annotate_missing_lines", &self.annotate_missing_lines)
            .field("annotation_type", &self.annotation_type)
            .field("annotations_output_path", &self.annotations_output_path)
            .field("annotations_data_branch", &self.annotations_data_branch)
            .field("max_files_in_comment", &self.max_files_in_comment)
            .field("complete_project_report", &self.complete_project_report)
            .field("skip_covered_files_in_report", &self.skip_covered_files_in_report)
            .field("coverage_report_url", &self.coverage_report_url)
            .field("debug", &self.debug)
            .finish()
    }
}

/// `1`, `true` and `yes` (any case) are true, anything else is false.
#[must_use]
pub fn str_to_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes")
}

/// The coverage report must be an existing `.json` file.
pub fn resolve_coverage_path(value: &str) -> Result<PathBuf> {
    let path = Path::new(value);
    if !path.is_file() {
        return Err(PrcovError::Configuration(format!(
            "COVERAGE_PATH: {value} does not exist or is not a file"
        )));
    }
    if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
        return Err(PrcovError::Configuration(format!(
            "COVERAGE_PATH: {value} is not a JSON file"
        )));
    }
    Ok(path.canonicalize()?)
}

/// PR number from a pull request ref ("refs/pull/42/merge" → 42).
fn pr_number_from_ref(github_ref: &str) -> Option<u64> {
    let mut parts = github_ref.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("refs"), Some("pull"), Some(number)) => number.parse().ok(),
        _ => None,
    }
}

fn parse_number<N: std::str::FromStr>(key: &str, value: &str) -> Result<N> {
    value
        .trim()
        .parse()
        .map_err(|_| PrcovError::Configuration(format!("{key}: '{value}' is not a valid number")))
}

fn parse_ratio(key: &str, value: &str) -> Result<Ratio> {
    value
        .parse()
        .map_err(|e| PrcovError::Configuration(format!("{key}: {e}")))
}

impl Config {
    /// Default log level: `debug` when `DEBUG` is set, `info` otherwise.
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_environ(std::env::vars())
    }

    /// Build the configuration from `(name, value)` pairs. Empty values are
    /// treated as unset.
    pub fn from_environ<I, K, V>(environ: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let env: HashMap<String, String> = environ
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.is_empty())
            .collect();
        let get = |key: &str| env.get(key).map(String::as_str);

        let missing: Vec<String> = REQUIRED
            .iter()
            .filter(|&&key| get(key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PrcovError::MissingEnvironmentVariable(missing));
        }
        let required = |key: &str| get(key).unwrap_or_default().to_string();

        let github_ref = get("GITHUB_REF").map(str::to_string);
        let github_pr_number = match get("GITHUB_PR_NUMBER") {
            Some(value) => Some(parse_number("GITHUB_PR_NUMBER", value)?),
            None => github_ref.as_deref().and_then(pr_number_from_ref),
        };
        if github_pr_number.is_none() && github_ref.is_none() {
            return Err(PrcovError::Configuration(
                "either GITHUB_PR_NUMBER or GITHUB_REF must be provided".to_string(),
            ));
        }

        let annotations_output_path = match get("ANNOTATIONS_OUTPUT_PATH") {
            Some(value) => {
                let path = PathBuf::from(value);
                if !path.is_dir() {
                    return Err(PrcovError::Configuration(format!(
                        "ANNOTATIONS_OUTPUT_PATH: {value} is not an existing directory"
                    )));
                }
                Some(path)
            }
            None => None,
        };

        let flag = |key: &str| get(key).is_some_and(str_to_bool);

        Ok(Config {
            github_repository: required("GITHUB_REPOSITORY"),
            coverage_path: resolve_coverage_path(get("COVERAGE_PATH").unwrap_or_default())?,
            github_token: required("GITHUB_TOKEN"),
            github_pr_number,
            github_ref: github_ref.map(|r| r.trim_start_matches("refs/heads/").to_string()),
            github_base_ref: get("GITHUB_BASE_REF").unwrap_or("main").to_string(),
            subproject_id: get("SUBPROJECT_ID").map(str::to_string),
            minimum_green: get("MINIMUM_GREEN")
                .map(|v| parse_ratio("MINIMUM_GREEN", v))
                .transpose()?
                .unwrap_or(Ratio::from_integer(100)),
            minimum_orange: get("MINIMUM_ORANGE")
                .map(|v| parse_ratio("MINIMUM_ORANGE", v))
                .transpose()?
                .unwrap_or(Ratio::from_integer(70)),
            branch_coverage: flag("BRANCH_COVERAGE"),
            skip_coverage: flag("SKIP_COVERAGE"),
            annotate_missing_lines: flag("ANNOTATE_MISSING_LINES"),
            annotation_type: get("ANNOTATION_TYPE")
                .map(str::parse::<AnnotationType>)
                .transpose()?
                .unwrap_or_default(),
            annotations_output_path,
            annotations_data_branch: get("ANNOTATIONS_DATA_BRANCH").map(str::to_string),
            max_files_in_comment: get("MAX_FILES_IN_COMMENT")
                .map(|v| parse_number("MAX_FILES_IN_COMMENT", v))
                .transpose()?
                .unwrap_or(25),
            complete_project_report: flag("COMPLETE_PROJECT_REPORT"),
            skip_covered_files_in_report: flag("SKIP_COVERED_FILES_IN_REPORT"),
            coverage_report_url: get("COVERAGE_REPORT_URL").map(str::to_string),
            debug: flag("DEBUG"),
        })
    }
}

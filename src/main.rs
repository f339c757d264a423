use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use prcov::annotation::AnnotationType;
use prcov::cli::{self, AnnotateOptions, Style};
use prcov::config::Config;
use prcov::github::{GitHubClient, UreqTransport};

/// prcov: diff coverage reports and annotations for pull requests.
#[derive(Parser)]
#[command(name = "prcov", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Comment on a pull request and annotate its missing lines. Configured
    /// through environment variables (GITHUB_TOKEN, COVERAGE_PATH, ...).
    Run,

    /// Compute coverage for lines in a diff (patch coverage).
    DiffCoverage {
        /// coverage.py JSON report.
        #[arg(long)]
        coverage: PathBuf,

        /// Git diff arguments, e.g. "HEAD~1" or "main..HEAD".
        /// If neither this nor --diff-file is given, reads a unified diff from stdin.
        #[arg(long, conflicts_with = "diff_file")]
        git_diff: Option<String>,

        /// File holding a unified diff.
        #[arg(long)]
        diff_file: Option<PathBuf>,

        /// Optional path prefix to prepend to diff paths for matching
        /// against coverage data paths.
        #[arg(long)]
        path_prefix: Option<String>,

        /// Output style.
        #[arg(long, value_enum, default_value = "text")]
        style: Style,
    },

    /// Print annotations for the missing lines of a diff as JSON.
    Annotate {
        /// coverage.py JSON report.
        #[arg(long)]
        coverage: PathBuf,

        /// Git diff arguments, e.g. "HEAD~1" or "main..HEAD".
        #[arg(long, conflicts_with = "diff_file")]
        git_diff: Option<String>,

        /// File holding a unified diff.
        #[arg(long)]
        diff_file: Option<PathBuf>,

        #[arg(long)]
        path_prefix: Option<String>,

        /// notice, warning or error.
        #[arg(long, default_value = "warning")]
        annotation_type: AnnotationType,

        /// Annotate missing branches too.
        #[arg(long)]
        branch: bool,

        /// Directory to write `<pr>-annotations.json` into.
        #[arg(long, requires = "pr_number")]
        output: Option<PathBuf>,

        /// Pull request number, used to name the output file.
        #[arg(long)]
        pr_number: Option<u64>,
    },
}

/// `RUST_LOG` overrides `default_level`.
fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let output = match cli.command {
        Commands::Run => {
            let config = Config::from_env().context("Invalid configuration")?;
            init_logging(config.log_level());
            debug!(?config, "loaded configuration");
            let client = GitHubClient::new(
                UreqTransport::new(config.github_token.clone()),
                config.github_repository.clone(),
            );
            cli::cmd_run(&config, &client)?
        }
        Commands::DiffCoverage {
            coverage,
            git_diff,
            diff_file,
            path_prefix,
            style,
        } => {
            init_logging("info");
            let source = cli::diff_source(git_diff, diff_file);
            cli::cmd_diff_coverage(&coverage, source.as_ref(), path_prefix.as_deref(), style)?
        }
        Commands::Annotate {
            coverage,
            git_diff,
            diff_file,
            path_prefix,
            annotation_type,
            branch,
            output,
            pr_number,
        } => {
            init_logging("info");
            let source = cli::diff_source(git_diff, diff_file);
            let options = AnnotateOptions {
                path_prefix: path_prefix.as_deref(),
                annotation_type,
                branch,
                output: output.as_deref(),
                pr_number,
            };
            cli::cmd_annotate(&coverage, source.as_ref(), &options)?
        }
    };

    print!("{output}");
    Ok(())
}

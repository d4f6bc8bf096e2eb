//! # Commands
//!
//! - `patchflow history` - Stream file changes from the whole git history
//! - `patchflow git-request` - Stream file changes of a merge/pull request
//! - `patchflow commits` - Stream file changes of commits listed in a file
//! - `patchflow diff` - Stream uncommitted file changes

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use console::style;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::ui::colors;

const REPO_URL: &str = "https://github.com/patchflow/patchflow";

#[derive(Debug, Parser)]
#[command(
    name = "patchflow",
    version,
    styles = ui::clap_styles(),
    arg_required_else_help = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stream file changes from the git history
    #[command(visible_alias = "log")]
    History(HistoryArgs),

    /// Stream file changes of a merge/pull request
    #[command(visible_alias = "pr")]
    GitRequest(GitRequestArgs),

    /// Stream file changes of commits listed in a file
    #[command(visible_alias = "c")]
    Commits(CommitsArgs),

    /// Stream uncommitted working-tree changes
    #[command(visible_alias = "d")]
    Diff(DiffArgs),
}

impl Command {
    const fn common(&self) -> &CommonArgs {
        match self {
            Self::History(args) => &args.common,
            Self::GitRequest(args) => &args.common,
            Self::Commits(args) => &args.common,
            Self::Diff(args) => &args.common,
        }
    }
}

/// Output format for streamed file changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable terminal output.
    #[default]
    Text,
    /// One JSON object per file change.
    Json,
}

/// Flags shared by every command.
#[derive(Debug, clap::Args)]
pub struct CommonArgs {
    /// Repository to read from.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub repo: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t)]
    pub format: OutputFormat,

    /// Write output to a file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to `.patchflow.toml` configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// git executable to run.
    #[arg(long, value_name = "PATH")]
    pub git: Option<PathBuf>,

    /// Increase output verbosity (repeat for more detail).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Arguments for the `patchflow history` command.
#[derive(Debug, Parser)]
pub struct HistoryArgs {
    /// Options for `git log` in place of `--full-history --all`.
    #[arg(long, value_name = "OPTS", allow_hyphen_values = true)]
    pub log_opts: Option<String>,

    /// Source branch of a merge/pull request.
    #[arg(long, value_name = "BRANCH", requires = "target_branch")]
    pub source_branch: Option<String>,

    /// Target branch of a merge/pull request.
    #[arg(long, value_name = "BRANCH", requires = "source_branch")]
    pub target_branch: Option<String>,

    /// File listing one commit per line.
    #[arg(long, value_name = "PATH")]
    pub commits_file: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

/// Arguments for the `patchflow git-request` command.
#[derive(Debug, Parser)]
pub struct GitRequestArgs {
    /// Branch whose commits are scanned.
    #[arg(long, value_name = "BRANCH")]
    pub source_branch: String,

    /// Branch the source is merged into.
    #[arg(long, value_name = "BRANCH")]
    pub target_branch: String,

    /// Additional commits to scan after the branch range.
    #[arg(long, value_name = "PATH")]
    pub commits_file: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

/// Arguments for the `patchflow commits` command.
#[derive(Debug, Parser)]
pub struct CommitsArgs {
    /// File listing one commit per line.
    #[arg(long, value_name = "PATH")]
    pub commits_file: PathBuf,

    #[command(flatten)]
    common: CommonArgs,
}

/// Arguments for the `patchflow diff` command.
#[derive(Debug, Parser)]
pub struct DiffArgs {
    /// Read staged changes instead of the unstaged working tree.
    #[arg(long)]
    pub staged: bool,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() {
    let cli = parse_cli();

    init_logging(cli.command.common().verbose);

    if let Err(e) = run(cli.command) {
        ui::print_error(&format!("{e:#}"));
        std::process::exit(ui::exit::ERROR);
    }
}

fn parse_cli() -> Cli {
    let cmd = Cli::command().about(build_about()).after_help(build_after_help());

    let matches = cmd.get_matches();

    #[expect(clippy::expect_used, reason = "clap already validated args; this cannot fail")]
    Cli::from_arg_matches(&matches).expect("failed to parse arguments")
}

/// `RUST_LOG` wins; otherwise `-v` raises the level from `warn`.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::History(args) => commands::history::run(&args),
        Command::GitRequest(args) => commands::history::run_git_request(&args),
        Command::Commits(args) => commands::history::run_commits(&args),
        Command::Diff(args) => commands::diff::run(&args),
    }
}

fn build_about() -> String {
    format!(
        r"
  {} streams the file changes in a git repository as structured records.

  Reads the full history, a merge/pull request range, a list of commits,
  or the uncommitted working tree. git's own errors always fail the run.",
        colors::accent().apply_to("patchflow").bold()
    )
}

fn build_after_help() -> String {
    format!(
        r"
  {}
    patchflow history                               Every commit on every branch
    patchflow history --log-opts='-n 20'            The last 20 commits
    patchflow git-request --source-branch feature --target-branch main
    patchflow commits --commits-file commits.txt    Commits listed in a file
    patchflow diff --staged --format json           Staged changes as JSON lines

  Learn more: {}",
        style("Examples:").bold(),
        colors::accent().apply_to(REPO_URL).underlined()
    )
}

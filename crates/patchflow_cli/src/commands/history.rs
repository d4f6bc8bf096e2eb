//! History commands - stream file changes from committed history.

use std::time::Instant;

use anyhow::Context as _;
use patchflow_core::prelude::*;
use tracing::info;

use super::context::CommandContext;
use super::output;
use crate::ui::{self, FetchProgress, print_command_header};
use crate::{CommitsArgs, CommonArgs, GitRequestArgs, HistoryArgs};

/// Executes the `patchflow history` command.
///
/// Flags override the `[history]` table of the configuration file field by
/// field.
pub fn run(args: &HistoryArgs) -> super::Result {
    let ctx = CommandContext::load(&args.common)?;
    let options = merge_options(ctx.config.history_options(), args);

    scan(&ctx, &args.common, "history", &options)
}

/// Executes the `patchflow git-request` command.
pub fn run_git_request(args: &GitRequestArgs) -> super::Result {
    let range = RangeSpec::new(args.source_branch.as_str(), args.target_branch.as_str())
        .context("--source-branch and --target-branch must not be empty")?;

    let ctx = CommandContext::load(&args.common)?;
    let options = HistoryOptions {
        log_opts: None,
        range: Some(range),
        commits_file: args.commits_file.clone(),
    };

    scan(&ctx, &args.common, "git-request", &options)
}

/// Executes the `patchflow commits` command.
pub fn run_commits(args: &CommitsArgs) -> super::Result {
    let ctx = CommandContext::load(&args.common)?;
    let options = HistoryOptions {
        commits_file: Some(args.commits_file.clone()),
        ..HistoryOptions::default()
    };

    scan(&ctx, &args.common, "commits", &options)
}

fn merge_options(mut options: HistoryOptions, args: &HistoryArgs) -> HistoryOptions {
    if args.log_opts.is_some() {
        options.log_opts.clone_from(&args.log_opts);
    }
    if let Some(range) = RangeSpec::from_branches(args.source_branch.as_deref(), args.target_branch.as_deref()) {
        options.range = Some(range);
    }
    if args.commits_file.is_some() {
        options.commits_file.clone_from(&args.commits_file);
    }
    options
}

fn scan(ctx: &CommandContext, common: &CommonArgs, command: &str, options: &HistoryOptions) -> super::Result {
    let start = Instant::now();
    let interactive = output::is_interactive(common);

    if interactive {
        print_command_header(command);
    }

    if let Some(range) = &options.range {
        info!(source = range.source(), target = range.target(), "scanning branch range");
    }
    if let Some(path) = &options.commits_file {
        info!(path = %path.display(), "scanning commit list");
    }

    let progress = FetchProgress::new(interactive && options.is_range_mode());
    let stream = ctx.acquirer.history_with_observer(&ctx.repo, options, &progress);
    progress.finish();
    let mut stream = stream.with_context(|| format!("failed to read history of {}", ctx.repo.display()))?;

    let stats = output::write_output(common, &mut stream, start)?;
    output::report_warnings(&stats);

    if options.is_range_mode() && stats.commits == 0 {
        ui::print_info("no commits to scan");
    }

    Ok(())
}

#[cfg(test)]
#[expect(clippy::expect_used, reason = "tests use expect for clearer failure messages")]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::*;
    use crate::Cli;

    fn history_args(argv: &[&str]) -> HistoryArgs {
        let cli = Cli::try_parse_from(std::iter::once("patchflow").chain(argv.iter().copied())).expect("parse");
        match cli.command {
            crate::Command::History(args) => args,
            other => unreachable!("expected history, got {other:?}"),
        }
    }

    fn configured() -> HistoryOptions {
        HistoryOptions {
            log_opts: Some("--since=1.week".to_string()),
            range: RangeSpec::new("develop", "main"),
            commits_file: Some(PathBuf::from("from-config.txt")),
        }
    }

    #[test]
    fn config_values_survive_without_flags() {
        let merged = merge_options(configured(), &history_args(&["history"]));

        assert_eq!(merged.log_opts.as_deref(), Some("--since=1.week"));
        assert_eq!(merged.range, RangeSpec::new("develop", "main"));
        assert_eq!(merged.commits_file, Some(PathBuf::from("from-config.txt")));
    }

    #[test]
    fn flags_override_config_per_field() {
        let args = history_args(&[
            "history",
            "--log-opts",
            "-n 5",
            "--source-branch",
            "feature",
            "--target-branch",
            "release",
        ]);
        let merged = merge_options(configured(), &args);

        assert_eq!(merged.log_opts.as_deref(), Some("-n 5"));
        assert_eq!(merged.range, RangeSpec::new("feature", "release"));
        assert_eq!(merged.commits_file, Some(PathBuf::from("from-config.txt")));
    }

    #[test]
    fn commits_file_flag_alone_enters_range_mode() {
        let merged = merge_options(
            HistoryOptions::default(),
            &history_args(&["history", "--commits-file", "list.txt"]),
        );

        assert!(merged.is_range_mode());
        assert!(merged.range.is_none());
    }

    #[test]
    fn one_sided_branch_flag_is_rejected_by_clap() {
        let result = Cli::try_parse_from(["patchflow", "history", "--source-branch", "feature"]);
        assert!(result.is_err());
    }
}

//! Diff command - stream uncommitted working-tree changes.

use std::time::Instant;

use anyhow::Context as _;

use super::context::CommandContext;
use super::output;
use crate::DiffArgs;
use crate::ui::print_command_header;

/// Executes the `patchflow diff` command.
pub fn run(args: &DiffArgs) -> super::Result {
    let start = Instant::now();
    let common = &args.common;

    if output::is_interactive(common) {
        print_command_header(if args.staged { "diff --staged" } else { "diff" });
    }

    let ctx = CommandContext::load(common)?;
    let mut stream = ctx
        .acquirer
        .working_tree(&ctx.repo, args.staged)
        .with_context(|| format!("failed to diff {}", ctx.repo.display()))?;

    let stats = output::write_output(common, &mut stream, start)?;
    output::report_warnings(&stats);

    Ok(())
}

//! Output formatting for streamed file changes.

mod json;
mod text;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::{Duration, Instant};

use anyhow::Context as _;
use patchflow_core::prelude::*;

use crate::ui::{self, pluralise_word};
use crate::{CommonArgs, OutputFormat};

/// Running totals for one stream.
#[derive(Debug, Default)]
pub struct StreamStats {
    /// File changes written.
    pub files: usize,
    /// Distinct commits the file changes belonged to.
    pub commits: usize,
    /// Added lines across all file changes.
    pub lines_added: usize,
    /// Removed lines across all file changes.
    pub lines_removed: usize,
    /// Ignorable git diagnostics seen while streaming.
    pub warnings: Vec<String>,
    /// Wall-clock time from the start of the command.
    pub elapsed: Duration,
    last_commit: Option<CommitId>,
}

impl StreamStats {
    fn record(&mut self, change: &FileChange) {
        self.files += 1;
        self.lines_added += change.lines_added();
        self.lines_removed += change.lines_removed();

        let Some(commit) = &change.commit else {
            return;
        };

        if self.last_commit.as_ref() != Some(&commit.id) {
            self.commits += 1;
            self.last_commit = Some(commit.id.clone());
        }
    }
}

/// Whether the run is rendering plain text to a terminal-facing stdout.
#[must_use]
pub const fn is_interactive(args: &CommonArgs) -> bool {
    args.output.is_none() && matches!(args.format, OutputFormat::Text)
}

/// Writes every record of `stream` to a file or stdout as it arrives.
///
/// Stops at the first stream error; records already written stay written.
pub fn write_output(args: &CommonArgs, stream: &mut PatchStream, start: Instant) -> anyhow::Result<StreamStats> {
    if let Some(path) = &args.output {
        let file = File::create(path).with_context(|| format!("failed to create output file: {}", path.display()))?;
        console::set_colors_enabled(false);
        let mut writer = BufWriter::new(file);
        write_format(args.format, stream, &mut writer, start)
    } else {
        let stdout = std::io::stdout();
        let mut writer = stdout.lock();
        write_format(args.format, stream, &mut writer, start)
    }
}

/// Surfaces ignorable diagnostics once the stream has finished.
pub fn report_warnings(stats: &StreamStats) {
    if stats.warnings.is_empty() {
        return;
    }

    let count = stats.warnings.len();
    ui::print_warning(&format!(
        "git reported {count} ignorable {}; rerun with -v for details",
        pluralise_word(count, "diagnostic", "diagnostics")
    ));
}

fn write_format(
    format: OutputFormat,
    stream: &mut PatchStream,
    writer: &mut dyn Write,
    start: Instant,
) -> anyhow::Result<StreamStats> {
    let mut stats = StreamStats::default();
    let mut text = text::TextRenderer::default();

    for record in stream.by_ref() {
        let change = record.context("reading patch stream")?;
        stats.record(&change);

        match format {
            OutputFormat::Text => text.write_change(&change, writer)?,
            OutputFormat::Json => json::write_change(&change, writer)?,
        }
    }

    stats.warnings = stream.warnings().to_vec();
    stats.elapsed = start.elapsed();

    if format == OutputFormat::Text {
        text::write_summary(&stats, writer)?;
    }

    writer.flush()?;
    Ok(stats)
}

#[cfg(test)]
#[expect(clippy::expect_used, reason = "tests use expect for clearer failure messages")]
mod tests {
    use std::sync::Arc;

    use patchflow_core::PatchParser;

    use super::*;

    fn change(commit: Option<&str>, path: &str) -> FileChange {
        let patch = format!("diff --git a/{path} b/{path}\n--- a/{path}\n+++ b/{path}\n@@ -1 +1,2 @@\n-a\n+b\n+c\n");
        let mut parsed: Vec<FileChange> = PatchParser::new(patch.as_bytes())
            .collect::<Result<_, _>>()
            .expect("parse");
        let mut change = parsed.remove(0);
        change.commit = commit.map(|id| {
            Arc::new(CommitHeader {
                id: CommitId::new(id),
                author: None,
                date: None,
                message: String::new(),
            })
        });
        change
    }

    #[test]
    fn stats_count_consecutive_commits_once() {
        let mut stats = StreamStats::default();
        stats.record(&change(Some("aaa"), "a.txt"));
        stats.record(&change(Some("aaa"), "b.txt"));
        stats.record(&change(Some("bbb"), "c.txt"));

        assert_eq!(stats.files, 3);
        assert_eq!(stats.commits, 2);
        assert_eq!(stats.lines_added, 6);
        assert_eq!(stats.lines_removed, 3);
    }

    #[test]
    fn working_tree_changes_have_no_commits() {
        let mut stats = StreamStats::default();
        stats.record(&change(None, "a.txt"));

        assert_eq!(stats.files, 1);
        assert_eq!(stats.commits, 0);
    }
}

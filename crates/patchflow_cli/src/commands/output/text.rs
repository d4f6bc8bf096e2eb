//! Text output formatting for streamed file changes.

use std::io::Write;

use patchflow_core::prelude::*;

use super::StreamStats;
use crate::ui::{KIND_WIDTH, colors, format_duration, indicators, kind_style, pluralise_word, truncate_with_ellipsis};

const AUTHOR_MAX_CHARS: usize = 32;
const SUMMARY_MAX_CHARS: usize = 60;
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Writes one line per file change, preceded by a header whenever the
/// commit changes.
#[derive(Debug, Default)]
pub struct TextRenderer {
    current_commit: Option<CommitId>,
}

impl TextRenderer {
    /// Writes `change`, and its commit header if this is the commit's first file.
    pub fn write_change(&mut self, change: &FileChange, writer: &mut dyn Write) -> anyhow::Result<()> {
        if let Some(commit) = &change.commit {
            if self.current_commit.as_ref() != Some(&commit.id) {
                write_commit_header(commit, self.current_commit.is_some(), writer)?;
                self.current_commit = Some(commit.id.clone());
            }
        }

        writeln!(
            writer,
            "  {}  {}  {}",
            kind_style(change.kind).apply_to(format!("{:<KIND_WIDTH$}", change.kind.as_str())),
            colors::primary().apply_to(display_path(change)),
            line_counts(change)
        )?;

        Ok(())
    }
}

fn write_commit_header(commit: &CommitHeader, separate: bool, writer: &mut dyn Write) -> anyhow::Result<()> {
    if separate {
        writeln!(writer)?;
    }

    let mut parts = vec![colors::accent().apply_to(commit.id.short()).to_string()];

    if let Some(author) = &commit.author {
        parts.push(
            colors::secondary()
                .apply_to(truncate_with_ellipsis(author, AUTHOR_MAX_CHARS))
                .to_string(),
        );
    }
    if let Some(date) = &commit.date {
        parts.push(colors::muted().apply_to(date.format(DATE_FORMAT)).to_string());
    }
    if !commit.summary().is_empty() {
        parts.push(truncate_with_ellipsis(commit.summary(), SUMMARY_MAX_CHARS));
    }

    writeln!(writer, "{}", parts.join("  "))?;
    Ok(())
}

fn display_path(change: &FileChange) -> String {
    match (change.kind, &change.old_path, &change.new_path) {
        (ChangeKind::Renamed | ChangeKind::Copied, Some(old), Some(new)) => format!("{old} → {new}"),
        _ => change.path().unwrap_or_default().to_string(),
    }
}

fn line_counts(change: &FileChange) -> String {
    if change.is_binary {
        return colors::muted().apply_to("binary").to_string();
    }

    format!(
        "{} {}",
        colors::success().apply_to(format!("{}{}", indicators::ADDED, change.lines_added())),
        colors::error().apply_to(format!("{}{}", indicators::REMOVED, change.lines_removed()))
    )
}

/// Writes the closing summary line.
pub fn write_summary(stats: &StreamStats, writer: &mut dyn Write) -> anyhow::Result<()> {
    writeln!(writer)?;

    if stats.files == 0 {
        writeln!(
            writer,
            "{} {}",
            colors::muted().apply_to(indicators::SUCCESS),
            colors::secondary().apply_to("no file changes found")
        )?;
        return Ok(());
    }

    let mut summary = format!(
        "{} {} changed",
        stats.files,
        pluralise_word(stats.files, "file", "files")
    );
    if stats.commits > 0 {
        summary.push_str(&format!(
            " in {} {}",
            stats.commits,
            pluralise_word(stats.commits, "commit", "commits")
        ));
    }

    writeln!(
        writer,
        "{} {} ({} {}) {}",
        colors::success().apply_to(indicators::SUCCESS),
        colors::secondary().apply_to(summary),
        colors::success().apply_to(format!("{}{}", indicators::ADDED, stats.lines_added)),
        colors::error().apply_to(format!("{}{}", indicators::REMOVED, stats.lines_removed)),
        colors::muted().apply_to(format!("in {}", format_duration(stats.elapsed)))
    )?;

    Ok(())
}

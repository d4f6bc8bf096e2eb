//! UI helpers for consistent output formatting.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use patchflow_core::FetchObserver;
use patchflow_core::prelude::*;

/// Single-character Unicode glyphs used as status indicators.
pub mod indicators {
    /// Error indicator (✖).
    pub const ERROR: &str = "✖";
    /// Warning indicator (⚠).
    pub const WARNING: &str = "⚠";
    /// Informational indicator (ℹ).
    pub const INFO: &str = "ℹ";
    /// Success indicator (✓).
    pub const SUCCESS: &str = "✓";
    /// Addition indicator (+).
    pub const ADDED: &str = "+";
    /// Removal indicator (-).
    pub const REMOVED: &str = "-";
}

/// Semantic colour palette for terminal output.
pub mod colors {
    use console::Style;

    /// Red - errors and removed lines.
    pub const fn error() -> Style {
        Style::new().red()
    }

    /// Yellow - warnings.
    pub const fn warning() -> Style {
        Style::new().yellow()
    }

    /// Cyan - informational messages.
    pub const fn info() -> Style {
        Style::new().cyan()
    }

    /// Green - success messages and added lines.
    pub const fn success() -> Style {
        Style::new().green()
    }

    /// White bold - primary/headline text.
    pub const fn primary() -> Style {
        Style::new().white().bold()
    }

    /// Light grey - secondary descriptive text.
    pub const fn secondary() -> Style {
        Style::new().color256(252)
    }

    /// Dark grey - muted/contextual text.
    pub const fn muted() -> Style {
        Style::new().color256(243)
    }

    /// Cyan - accent highlights (commit ids, commands).
    pub const fn accent() -> Style {
        Style::new().cyan()
    }
}

/// Process exit codes.
pub mod exit {
    /// An unrecoverable error occurred.
    pub const ERROR: i32 = 2;
}

const KIND_ADDED_COLOR: u8 = 114;
const KIND_DELETED_COLOR: u8 = 203;
const KIND_MODIFIED_COLOR: u8 = 220;
const KIND_MOVED_COLOR: u8 = 75;

/// Column width reserved for the change kind in text output.
pub const KIND_WIDTH: usize = 8;

/// Returns the terminal colour style for a change kind.
pub const fn kind_style(kind: ChangeKind) -> Style {
    match kind {
        ChangeKind::Added => Style::new().color256(KIND_ADDED_COLOR),
        ChangeKind::Deleted => Style::new().color256(KIND_DELETED_COLOR),
        ChangeKind::Modified => Style::new().color256(KIND_MODIFIED_COLOR),
        ChangeKind::Renamed | ChangeKind::Copied => Style::new().color256(KIND_MOVED_COLOR),
    }
}

/// Prints a styled `patchflow <command>` header with surrounding blank lines.
pub fn print_command_header(command: &str) {
    eprintln!();
    eprintln!(
        "{} {}",
        colors::accent().bold().apply_to("patchflow"),
        colors::muted().apply_to(command)
    );
    eprintln!();
}

/// Prints a red error message to stderr.
pub fn print_error(message: &str) {
    eprintln!(
        "{} {}",
        colors::error().apply_to(indicators::ERROR),
        colors::secondary().apply_to(message)
    );
}

/// Prints a yellow warning message to stderr.
pub fn print_warning(message: &str) {
    eprintln!(
        "{} {}",
        colors::warning().apply_to(indicators::WARNING),
        colors::secondary().apply_to(message)
    );
}

/// Prints a cyan informational message to stderr.
pub fn print_info(message: &str) {
    eprintln!(
        "{} {}",
        colors::info().apply_to(indicators::INFO),
        colors::secondary().apply_to(message)
    );
}

/// Returns `singular` when `count` is 1, otherwise `plural`.
#[must_use]
pub const fn pluralise_word<'a>(count: usize, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 { singular } else { plural }
}

/// Truncates a string to `max_chars`, appending an ellipsis if shortened.
#[must_use]
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{truncated}…")
    }
}

const PROGRESS_TICK_MS: u64 = 100;

/// Creates a progress bar for commit fetching. The length is set once the
/// commit count is known.
#[must_use]
pub fn create_commit_progress() -> ProgressBar {
    let pb = ProgressBar::new(0);

    #[expect(
        clippy::expect_used,
        reason = "static template string; failure is a programmer error"
    )]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/243} {percent:>3}% {pos}/{len} commits ({elapsed} elapsed)")
            .expect("invalid progress template")
            .progress_chars("━━╸"),
    );

    pb.enable_steady_tick(Duration::from_millis(PROGRESS_TICK_MS));
    pb
}

/// Reports commit fetches on a progress bar, or nowhere when hidden.
#[derive(Debug)]
pub enum FetchProgress {
    /// Draws a bar on stderr.
    Bar(ProgressBar),
    /// Draws nothing.
    Hidden,
}

impl FetchProgress {
    /// A visible bar when `show` is set.
    #[must_use]
    pub fn new(show: bool) -> Self {
        if show {
            Self::Bar(create_commit_progress())
        } else {
            Self::Hidden
        }
    }

    /// Removes the bar from the terminal.
    pub fn finish(&self) {
        if let Self::Bar(pb) = self {
            pb.finish_and_clear();
        }
    }
}

impl FetchObserver for FetchProgress {
    fn started(&self, total: usize) {
        if let Self::Bar(pb) = self {
            pb.set_length(total as u64);
        }
    }

    fn fetched(&self, _index: usize, _commit: &CommitId) {
        if let Self::Bar(pb) = self {
            pb.inc(1);
        }
    }
}

const MICROSECOND_NS: u128 = 1_000;
const MILLISECOND_NS: u128 = 1_000_000;
const SECOND_NS: u128 = 1_000_000_000;

/// Formats a duration as a human-readable string with the most appropriate
/// unit (ns, µs, ms, or s).
#[expect(
    clippy::cast_precision_loss,
    reason = "nanosecond-to-float conversion is display-only; precision loss is acceptable"
)]
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();

    if nanos < MICROSECOND_NS {
        format!("{nanos}ns")
    } else if nanos < MILLISECOND_NS {
        format!("{:.1}µs", nanos as f64 / MICROSECOND_NS as f64)
    } else if nanos < SECOND_NS {
        format!("{:.1}ms", nanos as f64 / MILLISECOND_NS as f64)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}

/// Returns the shared clap colour theme used by all CLI subcommands.
#[must_use]
pub fn clap_styles() -> clap::builder::Styles {
    use clap::builder::styling::{AnsiColor, Effects, Style};

    clap::builder::Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Cyan.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::BrightBlack.into())))
        .valid(Style::new().fg_color(Some(AnsiColor::Green.into())))
        .invalid(Style::new().fg_color(Some(AnsiColor::Red.into())))
        .error(
            Style::new()
                .fg_color(Some(AnsiColor::Red.into()))
                .effects(Effects::BOLD),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicators_are_single_chars() {
        assert_eq!(indicators::ERROR.chars().count(), 1);
        assert_eq!(indicators::WARNING.chars().count(), 1);
        assert_eq!(indicators::INFO.chars().count(), 1);
        assert_eq!(indicators::SUCCESS.chars().count(), 1);
        assert_eq!(indicators::ADDED.chars().count(), 1);
        assert_eq!(indicators::REMOVED.chars().count(), 1);
    }

    #[test]
    fn test_pluralise_word() {
        assert_eq!(pluralise_word(0, "commit", "commits"), "commits");
        assert_eq!(pluralise_word(1, "commit", "commits"), "commit");
        assert_eq!(pluralise_word(2, "commit", "commits"), "commits");
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        assert_eq!(truncate_with_ellipsis("longer text", 6), "longe…");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_nanos(500)), "500ns");
        assert_eq!(format_duration(Duration::from_micros(500)), "500.0µs");
        assert_eq!(format_duration(Duration::from_millis(500)), "500.0ms");
        assert_eq!(format_duration(Duration::from_secs(2)), "2.00s");
    }

    #[test]
    fn hidden_progress_ignores_events() {
        let progress = FetchProgress::new(false);
        progress.started(3);
        progress.fetched(0, &CommitId::new("abc"));
        progress.finish();
        assert!(matches!(progress, FetchProgress::Hidden));
    }

    #[test]
    fn bar_progress_tracks_fetches() {
        let progress = FetchProgress::new(true);
        progress.started(2);
        progress.fetched(0, &CommitId::new("abc"));

        let FetchProgress::Bar(pb) = &progress else {
            return;
        };
        assert_eq!(pb.length(), Some(2));
        assert_eq!(pb.position(), 1);
        progress.finish();
    }
}

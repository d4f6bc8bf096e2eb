use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::resolve::CommitId;

/// Metadata from a `commit <id>` header in `git log -p` / `git show` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitHeader {
    /// The commit identifier.
    pub id: CommitId,
    /// The `Author:` value, typically `Name <email>`.
    pub author: Option<String>,
    /// The author date, if it was present and in git's default format.
    pub date: Option<DateTime<FixedOffset>>,
    /// The full commit message with its indentation removed.
    pub message: String,
}

impl CommitHeader {
    /// First line of the commit message.
    #[must_use]
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// What happened to a file in one patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The file was created.
    Added,
    /// The file was removed.
    Deleted,
    /// The file's content or mode changed in place.
    Modified,
    /// The file was moved, possibly with edits.
    Renamed,
    /// The file was copied, possibly with edits.
    Copied,
}

impl ChangeKind {
    /// Lowercase name used in output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Deleted => "deleted",
            Self::Modified => "modified",
            Self::Renamed => "renamed",
            Self::Copied => "copied",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a line inside a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp {
    /// Unchanged line present on both sides.
    Context,
    /// Line present only on the new side.
    Added,
    /// Line present only on the old side.
    Removed,
}

/// One line of a hunk, without its `+`/`-`/` ` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkLine {
    /// Whether the line was added, removed or is context.
    pub op: LineOp,
    /// Line content, excluding the trailing newline.
    pub text: String,
    /// Set when git marked the line with `\ No newline at end of file`.
    pub missing_newline: bool,
}

/// A contiguous block of changes (`@@ -a,b +c,d @@`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// First line number on the old side.
    pub old_start: u32,
    /// Number of old-side lines covered.
    pub old_lines: u32,
    /// First line number on the new side.
    pub new_start: u32,
    /// Number of new-side lines covered.
    pub new_lines: u32,
    /// Text after the closing `@@`, usually the enclosing function.
    pub section: String,
    /// Lines in patch order.
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// Added lines paired with their line number on the new side.
    pub fn added_lines(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        let mut next_line = self.new_start;

        self.lines.iter().filter_map(move |line| match line.op {
            LineOp::Removed => None,
            LineOp::Context => {
                next_line = next_line.saturating_add(1);
                None
            }
            LineOp::Added => {
                let number = next_line;
                next_line = next_line.saturating_add(1);
                Some((number, line.text.as_str()))
            }
        })
    }
}

/// All changes to one file within one patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// The commit this patch belongs to; `None` for working-tree diffs.
    pub commit: Option<Arc<CommitHeader>>,
    /// Path before the change; `None` for added files.
    pub old_path: Option<String>,
    /// Path after the change; `None` for deleted files.
    pub new_path: Option<String>,
    /// Kind of change.
    pub kind: ChangeKind,
    /// Set when git reported the content as binary.
    pub is_binary: bool,
    /// File mode before the change, when git reported one.
    pub old_mode: Option<String>,
    /// File mode after the change, when git reported one.
    pub new_mode: Option<String>,
    /// Hunks in patch order.
    pub hunks: Vec<Hunk>,
}

impl FileChange {
    pub(crate) fn new(commit: Option<Arc<CommitHeader>>, old_path: Option<String>, new_path: Option<String>) -> Self {
        Self {
            commit,
            old_path,
            new_path,
            kind: ChangeKind::Modified,
            is_binary: false,
            old_mode: None,
            new_mode: None,
            hunks: Vec::new(),
        }
    }

    /// The path that best identifies this file: the new path, or the old one
    /// for deletions.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.new_path.as_deref().or(self.old_path.as_deref())
    }

    /// Added lines across all hunks, with new-side line numbers.
    pub fn added_lines(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.hunks.iter().flat_map(Hunk::added_lines)
    }

    /// Number of added lines.
    #[must_use]
    pub fn lines_added(&self) -> usize {
        self.count_lines(LineOp::Added)
    }

    /// Number of removed lines.
    #[must_use]
    pub fn lines_removed(&self) -> usize {
        self.count_lines(LineOp::Removed)
    }

    fn count_lines(&self, op: LineOp) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| &h.lines)
            .filter(|l| l.op == op)
            .count()
    }
}

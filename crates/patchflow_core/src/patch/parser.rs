use std::io::{self, BufRead};
use std::iter::FusedIterator;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use super::path::{NEW_PREFIX, OLD_PREFIX, parse_header_paths, parse_marker_path, parse_plain_path};
use super::types::{ChangeKind, CommitHeader, FileChange, Hunk, HunkLine, LineOp};
use crate::resolve::CommitId;

/// git's default `Date:` format, e.g. `Mon Jan 15 10:30:00 2024 +0000`.
const GIT_DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y %z";
const MESSAGE_INDENT: &str = "    ";

/// The patch document was malformed or could not be read.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Reading the underlying stream failed.
    #[error("failed to read patch stream: {0}")]
    Io(#[from] io::Error),

    /// The document does not follow git's patch format.
    #[error("malformed patch at line {line}: {reason}")]
    Malformed {
        /// One-based line number where parsing failed.
        line: usize,
        /// What was wrong.
        reason: String,
    },
}

/// Lazily parses `git log -p`, `git show` or `git diff` output into
/// [`FileChange`] records.
///
/// Yields records in document order. After the first error the iterator is
/// exhausted.
#[derive(Debug)]
pub struct PatchParser<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
    peeked: Option<String>,
    commit: Option<Arc<CommitHeader>>,
    finished: bool,
}

impl<R: BufRead> PatchParser<R> {
    /// Creates a parser over `reader`. Nothing is read until the first call to `next`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
            peeked: None,
            commit: None,
            finished: false,
        }
    }

    /// Blocks until the reader has buffered input or reached EOF, returning
    /// the number of bytes available.
    pub(crate) fn fill_buf(&mut self) -> io::Result<usize> {
        self.reader.fill_buf().map(<[u8]>::len)
    }

    fn next_line(&mut self) -> Result<Option<String>, ParseError> {
        if let Some(line) = self.peeked.take() {
            return Ok(Some(line));
        }

        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }

        self.line_no += 1;
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }

        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    fn push_back(&mut self, line: String) {
        self.peeked = Some(line);
    }

    fn malformed(&self, reason: impl Into<String>) -> ParseError {
        ParseError::Malformed {
            line: self.line_no,
            reason: reason.into(),
        }
    }

    fn parse_next(&mut self) -> Result<Option<FileChange>, ParseError> {
        loop {
            let Some(line) = self.next_line()? else {
                return Ok(None);
            };

            if let Some(rest) = line.strip_prefix("commit ") {
                let header = self.parse_commit(rest)?;
                self.commit = Some(Arc::new(header));
            } else if let Some(rest) = line.strip_prefix("diff --git ") {
                return self.parse_file(rest).map(Some);
            } else if is_combined_header(&line) {
                self.skip_section()?;
            }
            // Anything else between file sections (blank separators, notes,
            // preamble) carries no patch data.
        }
    }

    fn parse_commit(&mut self, rest: &str) -> Result<CommitHeader, ParseError> {
        let id = rest
            .split_whitespace()
            .next()
            .ok_or_else(|| self.malformed("commit header without an identifier"))?;

        let mut header = CommitHeader {
            id: CommitId::new(id),
            author: None,
            date: None,
            message: String::new(),
        };

        loop {
            let Some(line) = self.next_line()? else {
                return Ok(header);
            };

            if line.is_empty() {
                break;
            }

            if is_section_boundary(&line) {
                self.push_back(line);
                return Ok(header);
            }

            if let Some(author) = line.strip_prefix("Author:") {
                header.author = Some(author.trim().to_string());
            } else if let Some(date) = line.strip_prefix("Date:") {
                header.date = parse_git_date(date);
            }
        }

        let mut message = Vec::new();
        loop {
            let Some(line) = self.next_line()? else {
                break;
            };

            if let Some(text) = line.strip_prefix(MESSAGE_INDENT) {
                message.push(text.to_string());
            } else if line.is_empty() {
                message.push(String::new());
            } else {
                self.push_back(line);
                break;
            }
        }

        while message.last().is_some_and(String::is_empty) {
            message.pop();
        }
        header.message = message.join("\n");

        Ok(header)
    }

    fn parse_file(&mut self, rest: &str) -> Result<FileChange, ParseError> {
        let (old_path, new_path) = parse_header_paths(rest);
        let mut file = FileChange::new(self.commit.clone(), old_path, new_path);

        loop {
            let Some(line) = self.next_line()? else {
                return Ok(finish_file(file));
            };

            if line.starts_with("@@") {
                let hunk = self.parse_hunk(&line)?;
                file.hunks.push(hunk);
                break;
            }

            if is_section_boundary(&line) {
                self.push_back(line);
                return Ok(finish_file(file));
            }

            if line == "GIT binary patch" {
                file.is_binary = true;
                self.skip_binary_data()?;
                continue;
            }

            apply_extended_header(&mut file, &line);
        }

        loop {
            let Some(line) = self.next_line()? else {
                return Ok(finish_file(file));
            };

            if line.starts_with("@@") {
                let hunk = self.parse_hunk(&line)?;
                file.hunks.push(hunk);
            } else if is_section_boundary(&line) {
                self.push_back(line);
                return Ok(finish_file(file));
            } else if !line.is_empty() {
                return Err(self.malformed(format!("unexpected line after hunk: {line:?}")));
            }
        }
    }

    fn parse_hunk(&mut self, header: &str) -> Result<Hunk, ParseError> {
        let mut hunk =
            parse_hunk_header(header).ok_or_else(|| self.malformed(format!("invalid hunk header: {header:?}")))?;

        let mut old_remaining = hunk.old_lines;
        let mut new_remaining = hunk.new_lines;

        while old_remaining > 0 || new_remaining > 0 {
            let Some(line) = self.next_line()? else {
                return Err(self.malformed("unexpected end of input inside hunk"));
            };

            let op = match line.as_bytes().first() {
                Some(b'+') if new_remaining > 0 => {
                    new_remaining -= 1;
                    LineOp::Added
                }
                Some(b'-') if old_remaining > 0 => {
                    old_remaining -= 1;
                    LineOp::Removed
                }
                Some(b' ') | None if old_remaining > 0 && new_remaining > 0 => {
                    old_remaining -= 1;
                    new_remaining -= 1;
                    LineOp::Context
                }
                Some(b'\\') => {
                    mark_missing_newline(&mut hunk);
                    continue;
                }
                _ => return Err(self.malformed(format!("line does not fit hunk: {line:?}"))),
            };

            hunk.lines.push(HunkLine {
                op,
                text: line.get(1..).unwrap_or_default().to_string(),
                missing_newline: false,
            });
        }

        match self.next_line()? {
            Some(line) if line.starts_with('\\') => mark_missing_newline(&mut hunk),
            Some(line) => self.push_back(line),
            None => {}
        }

        Ok(hunk)
    }

    fn skip_binary_data(&mut self) -> Result<(), ParseError> {
        while let Some(line) = self.next_line()? {
            if is_section_boundary(&line) {
                self.push_back(line);
                break;
            }
        }
        Ok(())
    }

    fn skip_section(&mut self) -> Result<(), ParseError> {
        while let Some(line) = self.next_line()? {
            if is_section_boundary(&line) {
                self.push_back(line);
                break;
            }
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for PatchParser<R> {
    type Item = Result<FileChange, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.parse_next() {
            Ok(Some(file)) => Some(Ok(file)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: BufRead> FusedIterator for PatchParser<R> {}

fn is_combined_header(line: &str) -> bool {
    line.starts_with("diff --cc ") || line.starts_with("diff --combined ")
}

fn is_section_boundary(line: &str) -> bool {
    line.starts_with("commit ") || line.starts_with("diff --git ") || is_combined_header(line)
}

fn apply_extended_header(file: &mut FileChange, line: &str) {
    if let Some(mode) = line.strip_prefix("new file mode ") {
        file.kind = ChangeKind::Added;
        file.new_mode = Some(mode.trim().to_string());
    } else if let Some(mode) = line.strip_prefix("deleted file mode ") {
        file.kind = ChangeKind::Deleted;
        file.old_mode = Some(mode.trim().to_string());
    } else if let Some(mode) = line.strip_prefix("old mode ") {
        file.old_mode = Some(mode.trim().to_string());
    } else if let Some(mode) = line.strip_prefix("new mode ") {
        file.new_mode = Some(mode.trim().to_string());
    } else if let Some(path) = line.strip_prefix("rename from ") {
        file.kind = ChangeKind::Renamed;
        file.old_path = Some(parse_plain_path(path));
    } else if let Some(path) = line.strip_prefix("rename to ") {
        file.kind = ChangeKind::Renamed;
        file.new_path = Some(parse_plain_path(path));
    } else if let Some(path) = line.strip_prefix("copy from ") {
        file.kind = ChangeKind::Copied;
        file.old_path = Some(parse_plain_path(path));
    } else if let Some(path) = line.strip_prefix("copy to ") {
        file.kind = ChangeKind::Copied;
        file.new_path = Some(parse_plain_path(path));
    } else if let Some(path) = line.strip_prefix("--- ") {
        file.old_path = parse_marker_path(path, OLD_PREFIX);
    } else if let Some(path) = line.strip_prefix("+++ ") {
        file.new_path = parse_marker_path(path, NEW_PREFIX);
    } else if line.starts_with("Binary files ") && line.ends_with(" differ") {
        file.is_binary = true;
    }
    // index, similarity and dissimilarity lines carry nothing we report.
}

fn finish_file(mut file: FileChange) -> FileChange {
    match file.kind {
        ChangeKind::Added => file.old_path = None,
        ChangeKind::Deleted => file.new_path = None,
        ChangeKind::Modified | ChangeKind::Renamed | ChangeKind::Copied => {}
    }
    file
}

fn mark_missing_newline(hunk: &mut Hunk) {
    if let Some(last) = hunk.lines.last_mut() {
        last.missing_newline = true;
    }
}

/// Parses `@@ -a[,b] +c[,d] @@[ section]` into an empty hunk.
fn parse_hunk_header(line: &str) -> Option<Hunk> {
    let rest = line.strip_prefix("@@ -")?;
    let (ranges, section) = rest.split_once(" @@")?;
    let (old, new) = ranges.split_once(" +")?;
    let (old_start, old_lines) = parse_range(old)?;
    let (new_start, new_lines) = parse_range(new)?;

    Some(Hunk {
        old_start,
        old_lines,
        new_start,
        new_lines,
        section: section.strip_prefix(' ').unwrap_or(section).to_string(),
        lines: Vec::new(),
    })
}

fn parse_range(range: &str) -> Option<(u32, u32)> {
    match range.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

fn parse_git_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let normalised = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    DateTime::parse_from_str(&normalised, GIT_DATE_FORMAT).ok()
}

#[cfg(test)]
#[expect(clippy::expect_used, reason = "tests use expect for clearer failure messages")]
mod tests {
    use std::io::Cursor;

    use chrono::{Datelike as _, Timelike as _};

    use super::*;

    fn parse(text: &str) -> Vec<Result<FileChange, ParseError>> {
        PatchParser::new(Cursor::new(text.to_string())).collect()
    }

    fn parse_ok(text: &str) -> Vec<FileChange> {
        parse(text)
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .expect("patch should parse")
    }

    const LOG: &str = "\
commit 1111111111111111111111111111111111111111
Author: Ada Lovelace <ada@example.com>
Date:   Mon Jan 15 10:30:00 2024 +0100

    Add config

    With a longer body.

diff --git a/config.env b/config.env
new file mode 100644
index 0000000..3b18e51
--- /dev/null
+++ b/config.env
@@ -0,0 +1,2 @@
+API_KEY=abc
+DEBUG=true
diff --git a/src/lib.rs b/src/lib.rs
index 3b18e51..8c7e5a6 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -3 +3 @@ fn main() {
-let x = 1;
+let x = 2;
@@ -10,2 +9,0 @@
-old one
-old two

commit 2222222222222222222222222222222222222222
Merge: 1111111 3333333
Author: Grace Hopper <grace@example.com>
Date:   Tue Feb 6 09:00:00 2024 -0500

    Remove secrets

diff --git a/secrets.txt b/secrets.txt
deleted file mode 100644
index 8c7e5a6..0000000
--- a/secrets.txt
+++ /dev/null
@@ -1 +0,0 @@
-hunter2
";

    #[test]
    fn parses_files_in_document_order_with_commit_attribution() {
        let files = parse_ok(LOG);

        let summary: Vec<_> = files
            .iter()
            .map(|f| {
                (
                    f.commit.as_ref().expect("commit").id.short().to_string(),
                    f.path().expect("path").to_string(),
                    f.kind,
                )
            })
            .collect();

        assert_eq!(
            summary,
            [
                ("1111111".to_string(), "config.env".to_string(), ChangeKind::Added),
                ("1111111".to_string(), "src/lib.rs".to_string(), ChangeKind::Modified),
                ("2222222".to_string(), "secrets.txt".to_string(), ChangeKind::Deleted),
            ]
        );
    }

    #[test]
    fn captures_commit_metadata() {
        let files = parse_ok(LOG);
        let commit = files[0].commit.as_ref().expect("commit");

        assert_eq!(commit.author.as_deref(), Some("Ada Lovelace <ada@example.com>"));
        assert_eq!(commit.message, "Add config\n\nWith a longer body.");
        assert_eq!(commit.summary(), "Add config");

        let date = commit.date.expect("date");
        assert_eq!((date.year(), date.month(), date.day()), (2024, 1, 15));
        assert_eq!(date.hour(), 10);
        assert_eq!(date.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn added_file_has_no_old_path_and_numbered_lines() {
        let files = parse_ok(LOG);
        let added = &files[0];

        assert_eq!(added.old_path, None);
        assert_eq!(added.new_mode.as_deref(), Some("100644"));
        let lines: Vec<_> = added.added_lines().collect();
        assert_eq!(lines, [(1, "API_KEY=abc"), (2, "DEBUG=true")]);
    }

    #[test]
    fn modified_file_has_all_hunks() {
        let files = parse_ok(LOG);
        let modified = &files[1];

        assert_eq!(modified.hunks.len(), 2);
        assert_eq!(modified.hunks[0].section, "fn main() {");
        assert_eq!((modified.hunks[0].old_start, modified.hunks[0].old_lines), (3, 1));
        assert_eq!(modified.lines_added(), 1);
        assert_eq!(modified.lines_removed(), 3);
    }

    #[test]
    fn deleted_file_has_no_new_path() {
        let files = parse_ok(LOG);
        assert_eq!(files[2].new_path, None);
        assert_eq!(files[2].old_path.as_deref(), Some("secrets.txt"));
    }

    #[test]
    fn working_tree_diff_has_no_commit() {
        let diff = "\
diff --git a/notes.md b/notes.md
index e69de29..d95f3ad 100644
--- a/notes.md
+++ b/notes.md
@@ -1,0 +2 @@
+token = xyz
";
        let files = parse_ok(diff);
        assert_eq!(files.len(), 1);
        assert!(files[0].commit.is_none());
    }

    #[test]
    fn rename_without_content_change() {
        let diff = "\
diff --git a/old name.txt b/new name.txt
similarity index 100%
rename from old name.txt
rename to new name.txt
";
        let files = parse_ok(diff);
        assert_eq!(files[0].kind, ChangeKind::Renamed);
        assert_eq!(files[0].old_path.as_deref(), Some("old name.txt"));
        assert_eq!(files[0].new_path.as_deref(), Some("new name.txt"));
        assert!(files[0].hunks.is_empty());
    }

    #[test]
    fn binary_file_is_flagged() {
        let diff = "\
diff --git a/logo.png b/logo.png
new file mode 100644
index 0000000..1c2d3e4
Binary files /dev/null and b/logo.png differ
diff --git a/a.txt b/a.txt
index 1..2 100644
--- a/a.txt
+++ b/a.txt
@@ -1 +1 @@
-a
+b
";
        let files = parse_ok(diff);
        assert_eq!(files.len(), 2);
        assert!(files[0].is_binary);
        assert_eq!(files[0].kind, ChangeKind::Added);
        assert!(!files[1].is_binary);
    }

    #[test]
    fn missing_newline_marker_is_attached_to_previous_line() {
        let diff = "\
diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -1 +1 @@
-old
\\ No newline at end of file
+new
\\ No newline at end of file
";
        let files = parse_ok(diff);
        let lines = &files[0].hunks[0].lines;
        assert!(lines.iter().all(|l| l.missing_newline));
    }

    #[test]
    fn hunk_content_resembling_headers_is_content() {
        let diff = "\
diff --git a/doc.txt b/doc.txt
--- a/doc.txt
+++ b/doc.txt
@@ -0,0 +1,2 @@
+commit deadbeef
+diff --git a/x b/x
";
        let files = parse_ok(diff);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].lines_added(), 2);
    }

    #[test]
    fn combined_merge_diff_is_skipped() {
        let show = "\
commit 4444444444444444444444444444444444444444
Merge: aaaaaaa bbbbbbb
Author: Test User <test@test.com>
Date:   Mon Jan 15 10:30:00 2024 +0000

    Merge branch 'x'

diff --cc conflicted.txt
index 1,2..3
--- a/conflicted.txt
+++ b/conflicted.txt
@@@ -1,1 -1,1 +1,1 @@@
- ours
 -theirs
++merged
";
        assert!(parse_ok(show).is_empty());
    }

    #[test]
    fn commit_without_changes_yields_nothing() {
        let log = "\
commit 5555555555555555555555555555555555555555
Author: Test User <test@test.com>
Date:   Mon Jan 15 10:30:00 2024 +0000

    Empty commit
";
        assert!(parse_ok(log).is_empty());
    }

    #[test]
    fn truncated_hunk_is_malformed_and_fuses() {
        let diff = "\
diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -0,0 +1,3 @@
+one
";
        let mut parser = PatchParser::new(Cursor::new(diff));
        let err = parser.next().expect("item").expect_err("should fail");
        assert!(matches!(err, ParseError::Malformed { line: 5, .. }), "{err}");
        assert!(parser.next().is_none());
    }

    #[test]
    fn invalid_hunk_header_is_malformed() {
        let diff = "\
diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -x +1 @@
";
        let results = parse(diff);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn garbage_after_hunk_is_malformed() {
        let diff = "\
diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -0,0 +1 @@
+one
this is not a patch line
";
        let results = parse(diff);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn hunk_header_defaults_count_to_one() {
        let hunk = parse_hunk_header("@@ -7 +9 @@").expect("valid header");
        assert_eq!((hunk.old_start, hunk.old_lines, hunk.new_start, hunk.new_lines), (7, 1, 9, 1));
        assert_eq!(hunk.section, "");
    }

    #[test]
    fn unparseable_date_is_none() {
        assert!(parse_git_date("yesterday").is_none());
        assert!(parse_git_date("  Mon Jan 15 10:30:00 2024 +0000").is_some());
    }

    #[test]
    fn added_line_numbers_saturate_at_u32_max() {
        let files = parse_ok("diff --git a/big b/big\n--- a/big\n+++ b/big\n@@ -1 +4294967295,2 @@\n-old\n+one\n+two\n");

        let added: Vec<(u32, &str)> = files[0].added_lines().collect();
        assert_eq!(added, [(u32::MAX, "one"), (u32::MAX, "two")]);
    }
}

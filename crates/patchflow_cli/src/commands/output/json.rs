//! JSON-lines output formatting: one object per file change.

use std::io::Write;

use patchflow_core::prelude::*;
use patchflow_core::LineOp;
use serde::Serialize;

#[derive(Serialize)]
struct JsonChange<'a> {
    commit: Option<JsonCommit<'a>>,
    kind: &'static str,
    path: Option<&'a str>,
    old_path: Option<&'a str>,
    new_path: Option<&'a str>,
    binary: bool,
    old_mode: Option<&'a str>,
    new_mode: Option<&'a str>,
    lines_added: usize,
    lines_removed: usize,
    hunks: Vec<JsonHunk<'a>>,
}

#[derive(Serialize)]
struct JsonCommit<'a> {
    hash: &'a CommitId,
    short_hash: &'a str,
    author: Option<&'a str>,
    date: Option<String>,
    message: &'a str,
}

#[derive(Serialize)]
struct JsonHunk<'a> {
    old_start: u32,
    old_lines: u32,
    new_start: u32,
    new_lines: u32,
    section: &'a str,
    added: Vec<JsonLine<'a>>,
    removed: Vec<&'a str>,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    line: u32,
    text: &'a str,
}

/// Serialises `change` as a single line of JSON.
pub fn write_change(change: &FileChange, writer: &mut dyn Write) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *writer, &convert_change(change))?;
    writeln!(writer)?;
    Ok(())
}

fn convert_change(change: &FileChange) -> JsonChange<'_> {
    JsonChange {
        commit: change.commit.as_deref().map(convert_commit),
        kind: change.kind.as_str(),
        path: change.path(),
        old_path: change.old_path.as_deref(),
        new_path: change.new_path.as_deref(),
        binary: change.is_binary,
        old_mode: change.old_mode.as_deref(),
        new_mode: change.new_mode.as_deref(),
        lines_added: change.lines_added(),
        lines_removed: change.lines_removed(),
        hunks: change.hunks.iter().map(convert_hunk).collect(),
    }
}

fn convert_commit(commit: &CommitHeader) -> JsonCommit<'_> {
    JsonCommit {
        hash: &commit.id,
        short_hash: commit.id.short(),
        author: commit.author.as_deref(),
        date: commit.date.map(|d| d.to_rfc3339()),
        message: &commit.message,
    }
}

fn convert_hunk(hunk: &Hunk) -> JsonHunk<'_> {
    JsonHunk {
        old_start: hunk.old_start,
        old_lines: hunk.old_lines,
        new_start: hunk.new_start,
        new_lines: hunk.new_lines,
        section: &hunk.section,
        added: hunk
            .added_lines()
            .map(|(line, text)| JsonLine { line, text })
            .collect(),
        removed: hunk
            .lines
            .iter()
            .filter(|l| l.op == LineOp::Removed)
            .map(|l| l.text.as_str())
            .collect(),
    }
}

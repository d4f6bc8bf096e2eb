//! Property-based tests for `patchflow_core`.
//!
//! These tests verify invariants that should hold for all inputs,
//! catching edge cases that hand-written tests might miss.

use std::io::{self, Cursor};
use std::path::Path;

use patchflow_core::assemble::{NoopObserver, PatchAssembler, PatchDocument};
use patchflow_core::diagnostics::{Classification, DEFAULT_IGNORABLE};
use patchflow_core::process::Git;
use patchflow_core::resolve::parse_commit_list;
use patchflow_core::{CommandInvocation, CommitId, DiagnosticRules, LaunchError, ProcessRunner, RunningProcess};
use proptest::prelude::*;

/// Answers `show -p -U0 <id>` with a block naming the commit.
struct EchoRunner;

impl ProcessRunner for EchoRunner {
    fn spawn(&self, invocation: &CommandInvocation) -> Result<RunningProcess, LaunchError> {
        let commit = invocation.subcommand().pop().unwrap_or_default();
        let block = format!("commit {commit}\n\ndiff --git a/{commit}.txt b/{commit}.txt\n");

        Ok(RunningProcess::from_readers(
            invocation.to_string(),
            Cursor::new(block.into_bytes()),
            io::empty(),
        ))
    }
}

fn commit_id() -> impl Strategy<Value = String> {
    "[0-9a-f]{7,40}"
}

proptest! {
    /// Commit lists are the first token of every non-blank line, in order.
    #[test]
    fn commit_list_is_first_token_of_each_line(
        lines in prop::collection::vec((commit_id(), "( [ -~]{0,30})?"), 0..20)
    ) {
        let text: String = lines.iter().map(|(id, rest)| format!("{id}{rest}\n")).collect();
        let expected: Vec<&str> = lines.iter().map(|(id, _)| id.as_str()).collect();

        let parsed = parse_commit_list(&text);
        let parsed: Vec<&str> = parsed.iter().map(CommitId::as_str).collect();

        prop_assert_eq!(parsed, expected);
    }

    /// Blank and whitespace-only lines never produce entries.
    #[test]
    fn blank_lines_never_produce_commits(
        ids in prop::collection::vec(commit_id(), 0..10),
        padding in prop::collection::vec("[ \t]{0,4}", 0..10)
    ) {
        let mut text = String::new();
        for (i, id) in ids.iter().enumerate() {
            if let Some(pad) = padding.get(i) {
                text.push_str(pad);
                text.push('\n');
            }
            text.push_str(id);
            text.push('\n');
        }

        prop_assert_eq!(parse_commit_list(&text).len(), ids.len());
    }

    /// An assembled document has one blank-line separator per adjacent pair of
    /// blocks, and its blocks follow the commit list.
    #[test]
    fn assembled_blocks_follow_list_order(ids in prop::collection::vec(commit_id(), 1..12)) {
        let commits: Vec<CommitId> = ids.iter().map(CommitId::new).collect();
        let rules = DiagnosticRules::default();
        let assembler = PatchAssembler::new(Git::new(&EchoRunner, &rules, Path::new("git")));

        let document = assembler
            .assemble(Path::new("."), &commits, &NoopObserver)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let text = String::from_utf8_lossy(document.as_bytes()).into_owned();

        prop_assert_eq!(text.matches("\n\ncommit ").count(), ids.len() - 1);

        let headers: Vec<&str> = text
            .lines()
            .filter_map(|line| line.strip_prefix("commit "))
            .collect();
        let expected: Vec<&str> = ids.iter().map(String::as_str).collect();
        prop_assert_eq!(headers, expected);
    }

    /// Empty blocks never introduce separators.
    #[test]
    fn empty_blocks_add_nothing(pattern in prop::collection::vec(any::<bool>(), 0..16)) {
        let mut document = PatchDocument::default();
        for (i, non_empty) in pattern.iter().enumerate() {
            let block = if *non_empty { format!("block {i}\n") } else { String::new() };
            document.push_block(CommitId::new(i.to_string()), block.as_bytes());
        }

        let blocks = pattern.iter().filter(|b| **b).count();
        let text = String::from_utf8_lossy(document.as_bytes()).into_owned();

        prop_assert_eq!(text.matches("\n\n").count(), blocks.saturating_sub(1));
        prop_assert_eq!(document.commits().len(), pattern.len());
    }

    /// Lines containing a default rule substring are always ignorable.
    #[test]
    fn lines_with_rename_notices_are_ignorable(
        prefix in "[ -~]{0,20}",
        suffix in "[ -~]{0,20}",
        index in 0..DEFAULT_IGNORABLE.len()
    ) {
        let line = format!("{prefix}{}{suffix}", DEFAULT_IGNORABLE[index]);
        prop_assert_eq!(DiagnosticRules::default().classify(&line), Classification::Ignorable);
    }

    /// Lines without any rule substring are always fatal.
    #[test]
    fn lines_without_rule_substrings_are_fatal(line in "[a-z:' ]{1,60}") {
        prop_assume!(!DEFAULT_IGNORABLE.iter().any(|p| line.contains(p)));
        prop_assert_eq!(DiagnosticRules::default().classify(&line), Classification::Fatal);
    }
}

//! End-to-end tests for top-level CLI behaviour.

use assert_cmd::Command;
use predicates::prelude::*;

fn patchflow() -> Command {
    Command::new(env!("CARGO_BIN_EXE_patchflow"))
}

#[test]
fn no_arguments_prints_help() {
    patchflow()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_lists_every_command() {
    patchflow()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("git-request"))
        .stdout(predicate::str::contains("commits"))
        .stdout(predicate::str::contains("diff"));
}

#[test]
fn version_flag_prints_version() {
    patchflow()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn git_request_requires_both_branches() {
    patchflow()
        .args(["git-request", "--source-branch", "feature"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--target-branch"));
}

#[test]
fn unknown_format_is_rejected() {
    patchflow()
        .args(["diff", "--format", "xml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("xml"));
}

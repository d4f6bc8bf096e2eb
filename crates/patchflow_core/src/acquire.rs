//! Entry points that pick an acquisition mode and stream parsed file changes.
//!
//! Exactly one mode is active per call:
//!
//! - **range/list**: commits resolved from a branch pair and/or a commits
//!   file are fetched one by one and concatenated in memory;
//! - **log**: a live `git log -p` over the whole history (or a custom range);
//! - **diff**: a live `git diff` of the working tree or the index.

use std::fmt;
use std::io::{BufReader, Cursor, Read};
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::assemble::{FetchObserver, NoopObserver, PatchAssembler};
use crate::diagnostics::{AbortSignal, ClassifierHandle, DiagnosticFatal, DiagnosticRules, spawn_classifier};
use crate::error::AcquireError;
use crate::patch::{FileChange, ParseError, PatchParser};
use crate::process::{CommandInvocation, DEFAULT_GIT_BINARY, Git, ProcessHandle, ProcessRunner, SystemRunner};
use crate::resolve::{CommitResolver, RangeSpec};

const FULL_HISTORY_ARGS: [&str; 2] = ["--full-history", "--all"];

/// Inputs for a history acquisition.
///
/// When `range` or `commits_file` is set the acquisition runs in range/list
/// mode and `log_opts` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryOptions {
    /// Options passed to `git log -p -U0` in place of `--full-history --all`,
    /// split on whitespace.
    pub log_opts: Option<String>,
    /// Source/target branch pair of a merge or pull request.
    pub range: Option<RangeSpec>,
    /// File listing one commit per line.
    pub commits_file: Option<PathBuf>,
}

impl HistoryOptions {
    /// Returns `true` when either range/list source is configured.
    #[must_use]
    pub fn is_range_mode(&self) -> bool {
        self.range.is_some() || self.commits_file.is_some()
    }

    fn log_args(&self) -> Vec<String> {
        let custom: Vec<String> = self
            .log_opts
            .as_deref()
            .map(|opts| opts.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        if custom.is_empty() {
            FULL_HISTORY_ARGS.iter().map(|&a| a.to_string()).collect()
        } else {
            custom
        }
    }
}

/// Acquires patch streams from a repository through a [`ProcessRunner`].
pub struct Acquirer<R = SystemRunner> {
    runner: R,
    rules: DiagnosticRules,
    git_binary: PathBuf,
}

impl Acquirer<SystemRunner> {
    /// An acquirer that runs `git` from `PATH` with the default diagnostic rules.
    #[must_use]
    pub fn new() -> Self {
        Self::with_runner(SystemRunner)
    }
}

impl Default for Acquirer<SystemRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ProcessRunner> Acquirer<R> {
    /// An acquirer that launches commands through `runner`.
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            rules: DiagnosticRules::default(),
            git_binary: PathBuf::from(DEFAULT_GIT_BINARY),
        }
    }

    /// Uses `binary` instead of `git` from `PATH`.
    #[must_use]
    pub fn with_git_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.git_binary = binary.into();
        self
    }

    /// Replaces the diagnostic rule table.
    #[must_use]
    pub fn with_rules(mut self, rules: DiagnosticRules) -> Self {
        self.rules = rules;
        self
    }

    /// The git executable in use.
    #[must_use]
    pub fn git_binary(&self) -> &Path {
        &self.git_binary
    }

    /// The diagnostic rule table in use.
    #[must_use]
    pub fn rules(&self) -> &DiagnosticRules {
        &self.rules
    }

    /// Streams history changes, in range/list mode when configured and from
    /// `git log -p` otherwise.
    pub fn history(&self, dir: &Path, options: &HistoryOptions) -> Result<PatchStream, AcquireError> {
        self.history_with_observer(dir, options, &NoopObserver)
    }

    /// Like [`history`](Self::history), reporting commit fetch progress to
    /// `observer` in range/list mode.
    pub fn history_with_observer(
        &self,
        dir: &Path,
        options: &HistoryOptions,
        observer: &dyn FetchObserver,
    ) -> Result<PatchStream, AcquireError> {
        let git = self.git();

        let resolved = CommitResolver::new(git).resolve(
            dir,
            options.range.as_ref(),
            options.commits_file.as_deref(),
        )?;

        if let Some(commits) = resolved {
            info!(commits = commits.len(), "acquiring patches in range/list mode");
            let document = PatchAssembler::new(git).assemble(dir, &commits, observer)?;

            return Ok(PatchStream::from_document(document.into_bytes()));
        }

        let invocation = git.command(dir).args(["log", "-p", "-U0"]).args(options.log_args());
        info!(command = %invocation, "acquiring patches in log mode");
        self.stream(&invocation)
    }

    /// Streams uncommitted changes: the index when `staged`, otherwise the
    /// unstaged working tree.
    pub fn working_tree(&self, dir: &Path, staged: bool) -> Result<PatchStream, AcquireError> {
        let mut invocation = self.git().command(dir).args(["diff", "-U0"]);
        if staged {
            invocation = invocation.arg("--staged");
        }
        let invocation = invocation.arg(".");

        info!(command = %invocation, staged, "acquiring patches in diff mode");
        self.stream(&invocation)
    }

    fn git(&self) -> Git<'_, R> {
        Git::new(&self.runner, &self.rules, &self.git_binary)
    }

    fn stream(&self, invocation: &CommandInvocation) -> Result<PatchStream, AcquireError> {
        let (stdout, stderr, handle) = self.runner.spawn(invocation)?.into_parts();

        let abort = AbortSignal::new();
        let classifier = spawn_classifier(stderr, self.rules.clone(), abort.clone());

        PatchStream::attach(stdout, handle, Some(classifier), abort)
    }
}

impl<R> fmt::Debug for Acquirer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquirer")
            .field("git_binary", &self.git_binary)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

type Source = BufReader<Box<dyn Read + Send>>;

/// A lazy, finite stream of [`FileChange`] records in patch order.
///
/// The stream owns the git process (if any). Dropping it early kills the
/// process. Once an error has been yielded the stream is exhausted.
pub struct PatchStream {
    parser: PatchParser<Source>,
    handle: ProcessHandle,
    classifier: Option<ClassifierHandle>,
    abort: AbortSignal,
    warnings: Vec<String>,
    done: bool,
}

impl PatchStream {
    fn from_document(text: Vec<u8>) -> Self {
        let reader: Box<dyn Read + Send> = Box::new(Cursor::new(text));

        Self {
            parser: PatchParser::new(BufReader::new(reader)),
            handle: ProcessHandle::detached("assembled patch document"),
            classifier: None,
            abort: AbortSignal::new(),
            warnings: Vec::new(),
            done: false,
        }
    }

    /// Waits until stdout has produced its first bytes (or EOF) before the
    /// stream is handed out.
    fn attach(
        stdout: Box<dyn Read + Send>,
        handle: ProcessHandle,
        classifier: Option<ClassifierHandle>,
        abort: AbortSignal,
    ) -> Result<Self, AcquireError> {
        let mut stream = Self {
            parser: PatchParser::new(BufReader::new(stdout)),
            handle,
            classifier,
            abort,
            warnings: Vec::new(),
            done: false,
        };

        match stream.parser.fill_buf() {
            Ok(bytes) => debug!(bytes, command = %stream.handle.command(), "output stream ready"),
            Err(e) => return Err(stream.fail_parse(ParseError::Io(e))),
        }

        if stream.abort.is_raised() {
            return Err(stream.abort_run());
        }

        Ok(stream)
    }

    /// Ignorable diagnostics git emitted. Complete once the stream is exhausted.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Joins the classifier, keeping its warnings and returning any fatal verdict.
    fn collect_diagnostics(&mut self) -> Result<(), DiagnosticFatal> {
        let Some(classifier) = self.classifier.take() else {
            return Ok(());
        };

        self.warnings = classifier.join().into_result()?;
        Ok(())
    }

    fn abort_run(&mut self) -> AcquireError {
        self.done = true;
        self.handle.kill();

        match self.collect_diagnostics() {
            Err(fatal) => fatal.into(),
            Ok(()) => DiagnosticFatal { lines: Vec::new() }.into(),
        }
    }

    fn fail_parse(&mut self, error: ParseError) -> AcquireError {
        self.done = true;
        self.handle.kill();

        match self.collect_diagnostics() {
            Err(fatal) => fatal.into(),
            Ok(()) => error.into(),
        }
    }

    fn finish(&mut self) -> Result<(), AcquireError> {
        self.done = true;
        let status = self.handle.wait();
        self.collect_diagnostics()?;

        match status {
            Ok(Some(status)) if !status.success() => Err(AcquireError::ProcessFailed {
                command: self.handle.command().to_string(),
                status,
            }),
            Ok(_) => Ok(()),
            Err(source) => Err(AcquireError::Wait {
                command: self.handle.command().to_string(),
                source,
            }),
        }
    }
}

impl Iterator for PatchStream {
    type Item = Result<FileChange, AcquireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.abort.is_raised() {
            return Some(Err(self.abort_run()));
        }

        match self.parser.next() {
            Some(Ok(file)) => Some(Ok(file)),
            Some(Err(e)) => Some(Err(self.fail_parse(e))),
            None => self.finish().err().map(Err),
        }
    }
}

impl FusedIterator for PatchStream {}

impl fmt::Debug for PatchStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchStream")
            .field("handle", &self.handle)
            .field("warnings", &self.warnings)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[expect(
    clippy::expect_used,
    clippy::panic,
    reason = "tests use expect and panic for clearer failure messages"
)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::test_utils::{ChunkedReader, FailingReader, Pipes, ScriptedRunner, show_block};

    const WORKING_DIFF: &str = "\
diff --git a/unstaged.txt b/unstaged.txt
index 1111111..2222222 100644
--- a/unstaged.txt
+++ b/unstaged.txt
@@ -1,0 +2 @@
+unstaged change
";

    const STAGED_DIFF: &str = "\
diff --git a/staged.txt b/staged.txt
new file mode 100644
index 0000000..3333333
--- /dev/null
+++ b/staged.txt
@@ -0,0 +1 @@
+staged change
";

    fn repo() -> &'static Path {
        Path::new("/repo")
    }

    fn paths(stream: PatchStream) -> Vec<String> {
        stream
            .map(|r| r.expect("record").path().expect("path").to_string())
            .collect()
    }

    fn diff_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .respond("diff -U0 --staged .", STAGED_DIFF, "")
            .respond("diff -U0 .", WORKING_DIFF, "")
    }

    #[test]
    fn unstaged_diff_runs_plain_diff() {
        let acquirer = Acquirer::with_runner(diff_runner());
        let stream = acquirer.working_tree(repo(), false).expect("acquire");

        assert_eq!(paths(stream), ["unstaged.txt"]);
        assert_eq!(acquirer.runner.calls(), [["diff", "-U0", "."]]);
    }

    #[test]
    fn staged_diff_runs_distinct_command() {
        let acquirer = Acquirer::with_runner(diff_runner());
        let stream = acquirer.working_tree(repo(), true).expect("acquire");

        assert_eq!(paths(stream), ["staged.txt"]);
        assert_eq!(acquirer.runner.calls(), [["diff", "-U0", "--staged", "."]]);
    }

    #[test]
    fn default_history_logs_everything() {
        let runner = ScriptedRunner::new().respond("log -p -U0", &show_block("abc1234", "a.txt", "x"), "");
        let acquirer = Acquirer::with_runner(runner);

        let stream = acquirer.history(repo(), &HistoryOptions::default()).expect("acquire");

        assert_eq!(paths(stream), ["a.txt"]);
        assert_eq!(
            acquirer.runner.calls(),
            [["log", "-p", "-U0", "--full-history", "--all"]]
        );
    }

    #[test]
    fn log_opts_replace_full_history_args() {
        let runner = ScriptedRunner::new().respond("log -p -U0", "", "");
        let acquirer = Acquirer::with_runner(runner);
        let options = HistoryOptions {
            log_opts: Some("  --since=2024-01-01   main~5..main ".to_string()),
            ..HistoryOptions::default()
        };

        let stream = acquirer.history(repo(), &options).expect("acquire");

        assert_eq!(stream.count(), 0);
        assert_eq!(
            acquirer.runner.calls(),
            [["log", "-p", "-U0", "--since=2024-01-01", "main~5..main"]]
        );
    }

    #[test]
    fn blank_log_opts_fall_back_to_full_history() {
        let options = HistoryOptions {
            log_opts: Some("   ".to_string()),
            ..HistoryOptions::default()
        };
        assert_eq!(options.log_args(), ["--full-history", "--all"]);
    }

    #[test]
    fn range_mode_fetches_commits_instead_of_logging() {
        let runner = ScriptedRunner::new()
            .respond("log --format=oneline", "ccc Third\nbbb Second\n", "")
            .respond("show -p -U0 ccc", &show_block("ccc", "c.txt", "3"), "")
            .respond("show -p -U0 bbb", &show_block("bbb", "b.txt", "2"), "");
        let acquirer = Acquirer::with_runner(runner);
        let options = HistoryOptions {
            log_opts: Some("--ignored".to_string()),
            range: RangeSpec::new("feature", "main"),
            commits_file: None,
        };

        let records: Vec<_> = acquirer
            .history(repo(), &options)
            .expect("acquire")
            .collect::<Result<_, _>>()
            .expect("records");

        let attributed: Vec<_> = records
            .iter()
            .map(|r| r.commit.as_ref().expect("commit").id.to_string())
            .collect();
        assert_eq!(attributed, ["ccc", "bbb"]);

        assert_eq!(
            acquirer.runner.calls(),
            [
                ["log", "--format=oneline", "--right-only", "main..feature"],
                ["show", "-p", "-U0", "ccc"],
                ["show", "-p", "-U0", "bbb"],
            ]
        );
    }

    #[test]
    fn range_resolving_to_nothing_is_an_empty_stream() {
        let runner = ScriptedRunner::new().respond("log --format=oneline", "", "");
        let acquirer = Acquirer::with_runner(runner);
        let options = HistoryOptions {
            range: RangeSpec::new("feature", "main"),
            ..HistoryOptions::default()
        };

        let stream = acquirer.history(repo(), &options).expect("acquire");

        assert_eq!(stream.count(), 0);
        assert_eq!(acquirer.runner.calls().len(), 1);
    }

    #[test]
    fn ignorable_diagnostics_are_kept_as_warnings() {
        let runner = ScriptedRunner::new().respond(
            "log -p -U0",
            &show_block("abc1234", "a.txt", "x"),
            "warning: exhaustive rename detection was skipped due to too many files.\n\
             warning: you may want to set your diff.renameLimit variable to at least 5000 and retry the command.\n",
        );
        let acquirer = Acquirer::with_runner(runner);

        let mut stream = acquirer.history(repo(), &HistoryOptions::default()).expect("acquire");
        let records: Vec<_> = stream.by_ref().collect::<Result<_, _>>().expect("records");

        assert_eq!(records.len(), 1);
        assert_eq!(stream.warnings().len(), 2);
    }

    #[test]
    fn fatal_diagnostic_fails_even_when_stdout_parses() {
        let runner = ScriptedRunner::new().respond(
            "log -p -U0",
            &show_block("abc1234", "a.txt", "x"),
            "fatal: bad object abc123\n",
        );
        let acquirer = Acquirer::with_runner(runner);

        let results: Vec<_> = match acquirer.history(repo(), &HistoryOptions::default()) {
            Ok(stream) => stream.collect(),
            Err(e) => vec![Err(e)],
        };

        let Some(Err(AcquireError::DiagnosticFatal(fatal))) = results.last() else {
            panic!("expected a fatal diagnostic, got {results:?}");
        };
        assert_eq!(fatal.lines, ["fatal: bad object abc123"]);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    }

    #[test]
    fn stream_is_fused_after_error() {
        let runner = ScriptedRunner::new().respond("diff -U0", "diff --git a/x b/x\n@@ -0,0 +1,2 @@\n+one\n", "");
        let acquirer = Acquirer::with_runner(runner);

        let mut stream = acquirer.working_tree(repo(), false).expect("acquire");

        assert!(matches!(stream.next(), Some(Err(AcquireError::Parse(_)))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn fatal_diagnostic_outranks_parse_error() {
        let runner = ScriptedRunner::new().respond(
            "diff -U0",
            "diff --git a/x b/x\n@@ -0,0 +1,2 @@\n+one\n",
            "fatal: unable to read index\n",
        );
        let acquirer = Acquirer::with_runner(runner);

        let results: Vec<_> = match acquirer.working_tree(repo(), false) {
            Ok(stream) => stream.collect(),
            Err(e) => vec![Err(e)],
        };

        assert!(matches!(results.as_slice(), [Err(AcquireError::DiagnosticFatal(_))]));
    }

    #[test]
    fn launch_failure_is_reported_before_streaming() {
        let runner = ScriptedRunner::new().fail_launch("diff");
        let acquirer = Acquirer::with_runner(runner);

        let err = acquirer.working_tree(repo(), false).expect_err("should fail");
        assert!(matches!(err, AcquireError::Launch(_)));
    }

    #[test]
    fn resolution_failure_is_reported() {
        let acquirer = Acquirer::with_runner(ScriptedRunner::new());
        let options = HistoryOptions {
            commits_file: Some(PathBuf::from("/no/such/commits.txt")),
            ..HistoryOptions::default()
        };

        let err = acquirer.history(repo(), &options).expect_err("should fail");
        assert!(matches!(err, AcquireError::Resolution(_)));
    }

    #[test]
    fn fetch_failure_is_reported() {
        let runner = ScriptedRunner::new()
            .respond("log --format=oneline", "bad1234 Broken\n", "")
            .respond("show -p -U0 bad1234", "", "fatal: bad object bad1234\n");
        let acquirer = Acquirer::with_runner(runner);
        let options = HistoryOptions {
            range: RangeSpec::new("feature", "main"),
            ..HistoryOptions::default()
        };

        let err = acquirer.history(repo(), &options).expect_err("should fail");
        let AcquireError::Fetch(fetch) = err else {
            panic!("expected a fetch error, got {err:?}");
        };
        assert_eq!(fetch.commit.as_str(), "bad1234");
    }

    #[test]
    fn custom_git_binary_is_used() {
        let acquirer = Acquirer::new().with_git_binary("/opt/git/bin/git");
        assert_eq!(acquirer.git_binary(), Path::new("/opt/git/bin/git"));
    }

    #[test]
    fn fatal_diagnostic_mid_stream_stops_later_records() {
        let runner = ScriptedRunner::new().respond_with("log -p -U0", || -> Pipes {
            let stdout = ChunkedReader::new()
                .chunk(Duration::ZERO, show_block("aaa1111", "a.txt", "1"))
                .chunk(Duration::from_millis(300), show_block("bbb2222", "b.txt", "2"))
                .chunk(Duration::from_millis(300), show_block("ccc3333", "c.txt", "3"));
            let stderr = ChunkedReader::new().chunk(Duration::from_millis(30), "fatal: bad object zzz\n");
            (Box::new(stdout), Box::new(stderr))
        });
        let acquirer = Acquirer::with_runner(runner);

        let results: Vec<_> = acquirer
            .history(repo(), &HistoryOptions::default())
            .expect("acquire")
            .collect();

        let [Ok(first), Err(AcquireError::DiagnosticFatal(fatal))] = results.as_slice() else {
            panic!("expected one record then a fatal diagnostic, got {results:?}");
        };
        assert_eq!(first.path(), Some("a.txt"));
        assert_eq!(fatal.lines, ["fatal: bad object zzz"]);
    }

    #[test]
    fn stream_is_handed_out_only_once_output_arrives() {
        let runner = ScriptedRunner::new().respond_with("diff -U0", || -> Pipes {
            let stdout = ChunkedReader::new().chunk(Duration::from_millis(100), WORKING_DIFF);
            (Box::new(stdout), Box::new(std::io::empty()))
        });
        let acquirer = Acquirer::with_runner(runner);

        let start = Instant::now();
        let stream = acquirer.working_tree(repo(), false).expect("acquire");

        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(paths(stream), ["unstaged.txt"]);
    }

    #[test]
    fn unreadable_output_fails_before_streaming() {
        let runner = ScriptedRunner::new().respond_with("log -p -U0", || -> Pipes {
            (Box::new(FailingReader), Box::new(std::io::empty()))
        });
        let acquirer = Acquirer::with_runner(runner);

        let err = acquirer
            .history(repo(), &HistoryOptions::default())
            .expect_err("should fail");
        assert!(matches!(err, AcquireError::Parse(ParseError::Io(_))), "{err}");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn dropping_stream_early_reaps_git() {
        use crate::test_utils::{is_reaped, sleeping_git};

        let dir = tempfile::TempDir::new().expect("tempdir");
        let (git, pid_file) = sleeping_git(dir.path(), WORKING_DIFF).expect("script");
        let acquirer = Acquirer::new().with_git_binary(git);

        let stream = acquirer.working_tree(dir.path(), false).expect("acquire");
        let pid: u32 = std::fs::read_to_string(&pid_file)
            .expect("pid file")
            .trim()
            .parse()
            .expect("pid");
        assert!(!is_reaped(pid));

        drop(stream);

        assert!(is_reaped(pid), "git process {pid} outlived its stream");
    }
}

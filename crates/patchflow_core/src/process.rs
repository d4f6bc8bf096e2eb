//! Launching git and exposing its two output channels.
//!
//! [`ProcessRunner`] is the seam between the acquisition pipeline and the OS:
//! [`SystemRunner`] spawns real processes, while tests substitute a scripted
//! runner that records invocations and replays canned output.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::debug;

use crate::diagnostics::{AbortSignal, DiagnosticRules, spawn_classifier};
use crate::error::{LaunchError, RunError};

/// Executable used when no override is configured.
pub const DEFAULT_GIT_BINARY: &str = "git";

/// Number of leading arguments (`-C <dir>`) that scope every git command.
const SCOPE_ARGS: usize = 2;

/// One external git command: executable, working directory and argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    program: PathBuf,
    working_dir: PathBuf,
    args: Vec<OsString>,
}

impl CommandInvocation {
    /// Starts a git command scoped to `working_dir` with `-C`.
    #[must_use]
    pub fn git(program: &Path, working_dir: &Path) -> Self {
        Self {
            program: program.to_path_buf(),
            working_dir: working_dir.to_path_buf(),
            args: vec![OsString::from("-C"), working_dir.as_os_str().to_owned()],
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Appends several arguments in order.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// The executable to run.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The repository directory the command operates on.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// The full argument vector, including the leading `-C <dir>`.
    #[must_use]
    pub fn args_os(&self) -> &[OsString] {
        &self.args
    }

    /// The git subcommand and its arguments (everything after `-C <dir>`),
    /// decoded lossily.
    #[must_use]
    pub fn subcommand(&self) -> Vec<String> {
        self.args
            .iter()
            .skip(SCOPE_ARGS)
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

impl fmt::Display for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Starts external commands and hands back their output channels.
pub trait ProcessRunner: Send + Sync {
    /// Starts `invocation` without waiting for any output.
    ///
    /// The caller owns draining both returned streams; a child blocked on a
    /// full pipe will otherwise never exit.
    fn spawn(&self, invocation: &CommandInvocation) -> Result<RunningProcess, LaunchError>;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for &R {
    fn spawn(&self, invocation: &CommandInvocation) -> Result<RunningProcess, LaunchError> {
        (**self).spawn(invocation)
    }
}

/// Runs commands as real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn spawn(&self, invocation: &CommandInvocation) -> Result<RunningProcess, LaunchError> {
        if !invocation.working_dir().is_dir() {
            return Err(LaunchError::new(
                invocation,
                io::Error::new(io::ErrorKind::NotFound, "working directory does not exist"),
            ));
        }

        debug!(command = %invocation, "launching");

        let mut child = Command::new(invocation.program())
            .args(invocation.args_os())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| LaunchError::new(invocation, source))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(LaunchError::new(
                invocation,
                io::Error::other("output pipes were not attached"),
            ));
        };

        Ok(RunningProcess {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            handle: ProcessHandle {
                child: Some(child),
                command: invocation.to_string(),
            },
        })
    }
}

/// A started command whose output channels have not been consumed yet.
pub struct RunningProcess {
    stdout: Box<dyn Read + Send>,
    stderr: Box<dyn Read + Send>,
    handle: ProcessHandle,
}

impl RunningProcess {
    /// Wraps in-memory readers as if they were a finished process's pipes.
    pub fn from_readers(
        command: impl Into<String>,
        stdout: impl Read + Send + 'static,
        stderr: impl Read + Send + 'static,
    ) -> Self {
        Self {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            handle: ProcessHandle::detached(command),
        }
    }

    /// Splits into stdout, stderr and the handle that reaps the process.
    #[must_use]
    pub fn into_parts(self) -> (Box<dyn Read + Send>, Box<dyn Read + Send>, ProcessHandle) {
        (self.stdout, self.stderr, self.handle)
    }
}

impl fmt::Debug for RunningProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningProcess")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Owns the child process, if any. Dropping an un-reaped handle kills the child.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Option<Child>,
    command: String,
}

impl ProcessHandle {
    /// A handle with no OS process behind it.
    pub fn detached(command: impl Into<String>) -> Self {
        Self {
            child: None,
            command: command.into(),
        }
    }

    /// Rendered command line, for error messages.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Waits for the child to exit. Returns `None` if there is nothing to wait for.
    pub fn wait(&mut self) -> io::Result<Option<ExitStatus>> {
        match self.child.take() {
            Some(mut child) => child.wait().map(Some),
            None => Ok(None),
        }
    }

    /// Kills and reaps the child if it is still owned by this handle.
    pub fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            debug!(command = %self.command, "terminating abandoned process");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.kill();
    }
}

/// A runner bound to one git executable and one diagnostic rule table.
pub struct Git<'a, R: ?Sized> {
    runner: &'a R,
    rules: &'a DiagnosticRules,
    binary: &'a Path,
}

impl<'a, R: ProcessRunner + ?Sized> Git<'a, R> {
    /// Binds `runner` to the `binary` executable.
    pub fn new(runner: &'a R, rules: &'a DiagnosticRules, binary: &'a Path) -> Self {
        Self { runner, rules, binary }
    }

    /// Starts building a command scoped to `dir`.
    #[must_use]
    pub fn command(&self, dir: &Path) -> CommandInvocation {
        CommandInvocation::git(self.binary, dir)
    }

    /// Starts a long-running command; see [`ProcessRunner::spawn`].
    pub fn spawn(&self, invocation: &CommandInvocation) -> Result<RunningProcess, LaunchError> {
        self.runner.spawn(invocation)
    }

    /// Runs a one-shot command; see [`run_to_completion`].
    pub fn run(&self, invocation: &CommandInvocation) -> Result<Vec<u8>, RunError> {
        run_to_completion(self.runner, self.rules, invocation)
    }
}

impl<R: ?Sized> Clone for Git<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R: ?Sized> Copy for Git<'_, R> {}

impl<R: ?Sized> fmt::Debug for Git<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Git")
            .field("binary", &self.binary)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

/// Runs a one-shot command to completion and returns its stdout.
///
/// stderr is classified on a separate thread while stdout is drained, so
/// neither pipe can fill up and stall the child.
pub fn run_to_completion<R: ProcessRunner + ?Sized>(
    runner: &R,
    rules: &DiagnosticRules,
    invocation: &CommandInvocation,
) -> Result<Vec<u8>, RunError> {
    let (mut stdout, stderr, mut handle) = runner.spawn(invocation)?.into_parts();
    let classifier = spawn_classifier(stderr, rules.clone(), AbortSignal::new());

    let mut output = Vec::new();
    if let Err(source) = stdout.read_to_end(&mut output) {
        handle.kill();
        let _ = classifier.join();
        return Err(RunError::Read {
            command: invocation.to_string(),
            source,
        });
    }
    drop(stdout);

    let status = handle.wait();
    let report = classifier.join();

    if let Err(fatal) = report.into_result() {
        return Err(RunError::Diagnostics {
            command: invocation.to_string(),
            fatal,
        });
    }

    match status {
        Ok(Some(status)) if !status.success() => Err(RunError::Exit {
            command: invocation.to_string(),
            status,
        }),
        Ok(_) => Ok(output),
        Err(source) => Err(RunError::Read {
            command: invocation.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
#[expect(
    clippy::expect_used,
    clippy::panic,
    reason = "tests use expect and panic for clearer failure messages"
)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedRunner;

    fn invocation() -> CommandInvocation {
        CommandInvocation::git(Path::new("git"), Path::new("/repo")).args(["show", "-p", "-U0", "abc123"])
    }

    #[test]
    fn invocation_scopes_git_to_working_dir() {
        let inv = invocation();
        let args: Vec<_> = inv.args_os().iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(args, ["-C", "/repo", "show", "-p", "-U0", "abc123"]);
        assert_eq!(inv.subcommand(), ["show", "-p", "-U0", "abc123"]);
    }

    #[test]
    fn invocation_displays_full_command_line() {
        assert_eq!(invocation().to_string(), "git -C /repo show -p -U0 abc123");
    }

    #[test]
    fn system_runner_rejects_missing_working_dir() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let missing = dir.path().join("nope");
        let inv = CommandInvocation::git(Path::new(DEFAULT_GIT_BINARY), &missing).arg("status");

        let err = SystemRunner.spawn(&inv).expect_err("should fail");
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn system_runner_reports_missing_binary() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let inv = CommandInvocation::git(Path::new("definitely-not-a-real-binary-7f3a"), dir.path()).arg("status");

        let err = SystemRunner.spawn(&inv).expect_err("should fail");
        assert!(err.command.starts_with("definitely-not-a-real-binary-7f3a -C"));
    }

    #[test]
    fn run_to_completion_returns_stdout() {
        let runner = ScriptedRunner::new().respond("show", "diff --git a/x b/x\n", "");

        let output = run_to_completion(&runner, &DiagnosticRules::default(), &invocation()).expect("run");
        assert_eq!(output, b"diff --git a/x b/x\n");
    }

    #[test]
    fn run_to_completion_tolerates_ignorable_diagnostics() {
        let runner = ScriptedRunner::new().respond(
            "show",
            "out\n",
            "exhaustive rename detection was skipped due to too many files.\n",
        );

        assert!(run_to_completion(&runner, &DiagnosticRules::default(), &invocation()).is_ok());
    }

    #[test]
    fn run_to_completion_fails_on_fatal_diagnostic() {
        let runner = ScriptedRunner::new().respond("show", "", "fatal: bad object abc123\n");

        let err = run_to_completion(&runner, &DiagnosticRules::default(), &invocation()).expect_err("should fail");
        match err {
            RunError::Diagnostics { fatal, .. } => assert_eq!(fatal.lines, ["fatal: bad object abc123"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn run_to_completion_surfaces_launch_failure() {
        let runner = ScriptedRunner::new().fail_launch("show");

        let err = run_to_completion(&runner, &DiagnosticRules::default(), &invocation()).expect_err("should fail");
        assert!(matches!(err, RunError::Launch(_)));
    }

    #[test]
    fn detached_handle_has_nothing_to_wait_for() {
        let mut handle = ProcessHandle::detached("git log");
        assert!(handle.wait().expect("wait").is_none());
        assert_eq!(handle.command(), "git log");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn dropping_handle_kills_and_reaps_child() {
        use crate::test_utils::{is_reaped, sleeping_git};

        let dir = tempfile::TempDir::new().expect("tempdir");
        let (git, pid_file) = sleeping_git(dir.path(), "ready\n").expect("script");

        let process = SystemRunner
            .spawn(&CommandInvocation::git(&git, dir.path()).arg("log"))
            .expect("spawn");
        let (mut stdout, _stderr, handle) = process.into_parts();

        let mut first = [0_u8; 1];
        stdout.read_exact(&mut first).expect("first byte");
        let pid: u32 = std::fs::read_to_string(&pid_file)
            .expect("pid file")
            .trim()
            .parse()
            .expect("pid");
        assert!(!is_reaped(pid));

        drop(handle);

        assert!(is_reaped(pid), "child {pid} survived its handle");
    }
}

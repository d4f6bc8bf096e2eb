//! Test utilities for `patchflow_core` (compiled only during testing).

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::error::LaunchError;
use crate::process::{CommandInvocation, ProcessRunner, RunningProcess};

/// Fresh stdout and stderr readers for one scripted invocation.
pub type Pipes = (Box<dyn Read + Send>, Box<dyn Read + Send>);

enum Response {
    Output { stdout: String, stderr: String },
    Readers(Box<dyn Fn() -> Pipes + Send + Sync>),
    LaunchFailure,
}

/// A [`ProcessRunner`] that replays canned output and records every invocation.
///
/// Responses are matched by substring against the space-joined git
/// subcommand, first registered match wins.
pub struct ScriptedRunner {
    responses: Vec<(String, Response)>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(mut self, needle: &str, stdout: &str, stderr: &str) -> Self {
        self.responses.push((
            needle.to_string(),
            Response::Output {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
        ));
        self
    }

    /// Answers with fresh stdout/stderr readers built by `pipes`.
    pub fn respond_with(mut self, needle: &str, pipes: impl Fn() -> Pipes + Send + Sync + 'static) -> Self {
        self.responses.push((needle.to_string(), Response::Readers(Box::new(pipes))));
        self
    }

    pub fn fail_launch(mut self, needle: &str) -> Self {
        self.responses.push((needle.to_string(), Response::LaunchFailure));
        self
    }

    /// Subcommands of every invocation seen so far, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn spawn(&self, invocation: &CommandInvocation) -> Result<RunningProcess, LaunchError> {
        let subcommand = invocation.subcommand();
        let joined = subcommand.join(" ");

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(subcommand);
        }

        let response = self
            .responses
            .iter()
            .find(|(needle, _)| joined.contains(needle.as_str()))
            .map(|(_, response)| response);

        match response {
            Some(Response::Output { stdout, stderr }) => Ok(RunningProcess::from_readers(
                invocation.to_string(),
                Cursor::new(stdout.clone().into_bytes()),
                Cursor::new(stderr.clone().into_bytes()),
            )),
            Some(Response::Readers(pipes)) => {
                let (stdout, stderr) = pipes();
                Ok(RunningProcess::from_readers(invocation.to_string(), stdout, stderr))
            }
            Some(Response::LaunchFailure) => Err(LaunchError::new(
                invocation,
                io::Error::new(io::ErrorKind::PermissionDenied, "scripted launch failure"),
            )),
            None => Err(LaunchError::new(
                invocation,
                io::Error::new(io::ErrorKind::NotFound, format!("no scripted response for `{joined}`")),
            )),
        }
    }
}

/// A `git show -p -U0` block for a commit touching one file.
pub fn show_block(commit: &str, path: &str, added: &str) -> String {
    format!(
        "commit {commit}\n\
         Author: Test User <test@test.com>\n\
         Date:   Mon Jan 15 10:30:00 2024 +0000\n\
         \n\
         \x20   change {path}\n\
         \n\
         diff --git a/{path} b/{path}\n\
         index 0000001..0000002 100644\n\
         --- a/{path}\n\
         +++ b/{path}\n\
         @@ -1,0 +2 @@\n\
         +{added}\n"
    )
}

/// A reader that hands out each chunk only after its delay has elapsed.
#[derive(Default)]
pub struct ChunkedReader {
    chunks: VecDeque<(Duration, Vec<u8>)>,
}

impl ChunkedReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk(mut self, delay: Duration, bytes: impl Into<Vec<u8>>) -> Self {
        self.chunks.push_back((delay, bytes.into()));
        self
    }
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some((delay, mut bytes)) = self.chunks.pop_front() else {
            return Ok(0);
        };
        thread::sleep(delay);

        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        if n < bytes.len() {
            self.chunks.push_front((Duration::ZERO, bytes.split_off(n)));
        }
        Ok(n)
    }
}

/// A reader whose every read fails.
pub struct FailingReader;

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
    }
}

/// Writes an executable stand-in for git into `dir`. It records its pid in
/// the returned file, prints `stdout`, then sleeps until killed.
#[cfg(unix)]
pub fn sleeping_git(dir: &Path, stdout: &str) -> io::Result<(PathBuf, PathBuf)> {
    use std::os::unix::fs::PermissionsExt as _;

    let script = dir.join("fake-git");
    let pid_file = dir.join("fake-git.pid");
    let body = format!(
        "#!/bin/sh\necho $$ > '{}'\nprintf '%s' '{}'\nexec sleep 30\n",
        pid_file.display(),
        stdout
    );
    fs::write(&script, body)?;
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;

    Ok((script, pid_file))
}

/// Whether `pid` has exited and been reaped (no `/proc` entry remains).
#[cfg(target_os = "linux")]
pub fn is_reaped(pid: u32) -> bool {
    !Path::new(&format!("/proc/{pid}")).exists()
}

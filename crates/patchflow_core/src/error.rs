use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::diagnostics::DiagnosticFatal;
use crate::patch::ParseError;
use crate::process::CommandInvocation;
use crate::resolve::CommitId;

/// The external command could not be started.
#[derive(Debug, Error)]
#[error("failed to launch `{command}`: {source}")]
pub struct LaunchError {
    /// Rendered command line that failed to start.
    pub command: String,
    /// The underlying OS error.
    #[source]
    pub source: io::Error,
}

impl LaunchError {
    pub(crate) fn new(invocation: &CommandInvocation, source: io::Error) -> Self {
        Self {
            command: invocation.to_string(),
            source,
        }
    }
}

/// A one-shot command (commit query or single-commit patch) did not complete cleanly.
#[derive(Debug, Error)]
pub enum RunError {
    /// The command could not be started.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// The command's output could not be read, or the process could not be reaped.
    #[error("failed to read output of `{command}`: {source}")]
    Read {
        /// Rendered command line.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The command wrote non-ignorable diagnostics to stderr.
    #[error("`{command}` failed: {fatal}")]
    Diagnostics {
        /// Rendered command line.
        command: String,
        /// The fatal diagnostic lines.
        #[source]
        fatal: DiagnosticFatal,
    },

    /// The command exited unsuccessfully without explaining why on stderr.
    #[error("`{command}` exited with {status}")]
    Exit {
        /// Rendered command line.
        command: String,
        /// Exit status reported by the OS.
        status: ExitStatus,
    },
}

/// Range or list commit resolution failed before any patch was fetched.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The branch-pair history query failed.
    #[error("failed to list commits in {range}: {source}")]
    Query {
        /// The `target..source` range that was queried.
        range: String,
        /// Why the query failed.
        #[source]
        source: RunError,
    },

    /// The commits file could not be opened or read.
    #[error("failed to read commits file '{path}': {source}")]
    File {
        /// Path to the commits file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// A single commit's patch could not be retrieved.
///
/// Assembly is fail-fast: patches fetched before this commit are discarded.
#[derive(Debug, Error)]
#[error("failed to fetch patch for commit {commit}: {source}")]
pub struct FetchError {
    /// The commit whose patch could not be fetched.
    pub commit: CommitId,
    /// Why the fetch failed.
    #[source]
    pub source: RunError,
}

/// Top-level error for an acquisition, surfaced to the caller of
/// [`Acquirer`](crate::Acquirer) or while iterating a [`PatchStream`](crate::PatchStream).
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The history or diff command could not be started.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Commit resolution for range/list mode failed.
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    /// A commit's patch could not be fetched during assembly.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// git reported a fatal condition on stderr; its stdout cannot be trusted.
    #[error(transparent)]
    DiagnosticFatal(#[from] DiagnosticFatal),

    /// The patch document was malformed or could not be read.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// git exited unsuccessfully without a fatal diagnostic.
    #[error("`{command}` exited with {status}")]
    ProcessFailed {
        /// Rendered command line.
        command: String,
        /// Exit status reported by the OS.
        status: ExitStatus,
    },

    /// The finished git process could not be reaped.
    #[error("failed to wait for `{command}`: {source}")]
    Wait {
        /// Rendered command line.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

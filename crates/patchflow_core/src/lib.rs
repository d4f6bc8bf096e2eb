//! Git patch acquisition engine for patchflow.
//!
//! This crate obtains unified-diff text from a git repository and streams it
//! as parsed [`FileChange`] records. It is meant to sit in front of a content
//! scanner: the scanner sees file changes, never git processes.
//!
//! # Main Types
//!
//! - [`Acquirer`] - Picks an acquisition mode and returns a [`PatchStream`]
//! - [`HistoryOptions`] - Branch pair, commits file and log options for history scans
//! - [`CommitResolver`] - Turns a branch pair or commits file into an ordered commit list
//! - [`PatchAssembler`] - Concatenates single-commit patches into one document
//! - [`PatchParser`] - Streaming parser for git's patch format
//! - [`DiagnosticRules`] - Which stderr lines are warnings rather than failures
//! - [`Config`] - User configuration loaded from `.patchflow.toml`
//!
//! # Error Handling
//!
//! This crate uses [`thiserror`] for structured, typed errors that library
//! consumers can match on:
//!
//! - [`LaunchError`] - git could not be started
//! - [`ResolveError`] / [`FetchError`] - range/list mode failures
//! - [`DiagnosticFatal`] - git reported a fatal condition on stderr
//! - [`ParseError`] - the patch text was malformed
//! - [`AcquireError`] - Top-level error enum combining the above
//!
//! The CLI crate (`patchflow_cli`) uses `anyhow` for error propagation.

/// Acquisition modes and the resulting record stream.
pub mod acquire;
/// Per-commit patch fetching and concatenation.
pub mod assemble;
/// User configuration loaded from `.patchflow.toml`.
pub mod config;
/// Classification of git's stderr.
pub mod diagnostics;
/// Error types for every stage of acquisition.
pub mod error;
/// Parsed patch records and the streaming parser.
pub mod patch;
/// Common re-exports for internal use.
pub mod prelude;
/// Process launching behind the [`ProcessRunner`] seam.
pub mod process;
/// Commit list resolution from branch pairs and commits files.
pub mod resolve;
#[cfg(test)]
pub(crate) mod test_utils;

pub use acquire::{Acquirer, HistoryOptions, PatchStream};
pub use assemble::{FetchObserver, NoopObserver, PatchAssembler, PatchDocument};
pub use config::{Config, ConfigError, DiagnosticsConfig, HistoryConfig};
pub use diagnostics::{AbortSignal, Classification, DiagnosticFatal, DiagnosticReport, DiagnosticRules};
pub use error::{AcquireError, FetchError, LaunchError, ResolveError, RunError};
pub use patch::{ChangeKind, CommitHeader, FileChange, Hunk, HunkLine, LineOp, ParseError, PatchParser};
pub use process::{CommandInvocation, Git, ProcessHandle, ProcessRunner, RunningProcess, SystemRunner};
pub use resolve::{CommitId, CommitResolver, RangeSpec};

/// Default filename for patchflow configuration.
pub const CONFIG_FILENAME: &str = ".patchflow.toml";

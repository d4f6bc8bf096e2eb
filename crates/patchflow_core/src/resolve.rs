//! Commit list resolution for range/list mode.
//!
//! A branch pair and a commits file each yield an ordered list of commit
//! identifiers; when both are configured the branch-pair list comes first.

use std::ffi::OsStr;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::ResolveError;
use crate::process::{Git, ProcessRunner};

const SHORT_ID_LENGTH: usize = 7;

/// An opaque commit identifier, as printed by `git log --format=oneline`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    /// Wraps an identifier without validating it; git validates on use.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The full identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first seven characters, or the whole identifier if shorter.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..SHORT_ID_LENGTH).unwrap_or(&self.0)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<OsStr> for CommitId {
    fn as_ref(&self) -> &OsStr {
        OsStr::new(&self.0)
    }
}

/// Source and target branch of a merge/pull request comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSpec {
    source: String,
    target: String,
}

impl RangeSpec {
    /// Returns `None` unless both branch names are non-empty.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Option<Self> {
        let source = source.into();
        let target = target.into();

        if source.trim().is_empty() || target.trim().is_empty() {
            return None;
        }

        Some(Self { source, target })
    }

    /// Builds a range from optional branch names; both must be present.
    #[must_use]
    pub fn from_branches(source: Option<&str>, target: Option<&str>) -> Option<Self> {
        Self::new(source?, target?)
    }

    /// The branch whose commits are inspected.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The branch the source is compared against.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The `target..source` revision range: commits on source but not on target.
    #[must_use]
    pub fn revision_range(&self) -> String {
        format!("{}..{}", self.target, self.source)
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.target, self.source)
    }
}

/// Extracts the first whitespace-delimited token of every non-blank line.
#[must_use]
pub fn parse_commit_list(text: &str) -> Vec<CommitId> {
    text.lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(CommitId::new)
        .collect()
}

/// Reads a commits file (one commit per line, identifier first).
pub fn read_commits_file(path: &Path) -> Result<Vec<CommitId>, ResolveError> {
    let bytes = std::fs::read(path).map_err(|source| ResolveError::File {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(parse_commit_list(&String::from_utf8_lossy(&bytes)))
}

/// Turns range/list configuration into an ordered commit list.
#[derive(Debug)]
pub struct CommitResolver<'a, R: ?Sized> {
    git: Git<'a, R>,
}

impl<'a, R: ProcessRunner + ?Sized> CommitResolver<'a, R> {
    /// Creates a resolver that queries history through `git`.
    pub fn new(git: Git<'a, R>) -> Self {
        Self { git }
    }

    /// Resolves the configured sources, branch pair first.
    ///
    /// Returns `Ok(None)` when neither source is configured, which tells the
    /// caller to fall back to a full history log.
    pub fn resolve(
        &self,
        dir: &Path,
        range: Option<&RangeSpec>,
        commits_file: Option<&Path>,
    ) -> Result<Option<Vec<CommitId>>, ResolveError> {
        if range.is_none() && commits_file.is_none() {
            return Ok(None);
        }

        let mut commits = Vec::new();

        if let Some(range) = range {
            let from_range = self.branch_commits(dir, range)?;
            info!(range = %range, count = from_range.len(), "resolved commits from branch pair");
            commits.extend(from_range);
        }

        if let Some(path) = commits_file {
            let from_file = read_commits_file(path)?;
            info!(path = %path.display(), count = from_file.len(), "resolved commits from file");
            commits.extend(from_file);
        }

        if commits.is_empty() {
            warn!("commit resolution produced no commits; nothing to scan");
        }

        Ok(Some(commits))
    }

    /// Lists commits reachable from the source branch but not the target,
    /// most recent first.
    pub fn branch_commits(&self, dir: &Path, range: &RangeSpec) -> Result<Vec<CommitId>, ResolveError> {
        let invocation = self
            .git
            .command(dir)
            .args(["log", "--format=oneline", "--right-only"])
            .arg(range.revision_range());

        let output = self.git.run(&invocation).map_err(|source| ResolveError::Query {
            range: range.revision_range(),
            source,
        })?;

        Ok(parse_commit_list(&String::from_utf8_lossy(&output)))
    }
}

//! Builds one patch document from an ordered commit list.

use std::path::Path;

use tracing::{debug, info};

use crate::error::FetchError;
use crate::process::{Git, ProcessRunner};
use crate::resolve::CommitId;

/// Concatenated `git show` output for a list of commits, in list order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchDocument {
    text: Vec<u8>,
    commits: Vec<CommitId>,
}

impl PatchDocument {
    /// The raw patch text.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.text
    }

    /// Consumes the document, returning the raw patch text.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.text
    }

    /// The commits whose patches make up this document, in block order.
    #[must_use]
    pub fn commits(&self) -> &[CommitId] {
        &self.commits
    }

    /// Returns `true` if the document holds no patch text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Appends one commit's block, separated from the previous non-empty
    /// block by exactly one blank line.
    pub fn push_block(&mut self, commit: CommitId, block: &[u8]) {
        self.commits.push(commit);

        if block.is_empty() {
            return;
        }

        if !self.text.is_empty() {
            if !self.text.ends_with(b"\n") {
                self.text.push(b'\n');
            }
            self.text.push(b'\n');
        }

        self.text.extend_from_slice(block);
    }
}

/// Receives progress while commits are fetched.
pub trait FetchObserver {
    /// Called once with the number of commits before the first fetch.
    fn started(&self, _total: usize) {}

    /// Called after each commit's patch has been fetched; `index` is zero-based.
    fn fetched(&self, _index: usize, _commit: &CommitId) {}
}

/// Observer that ignores all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl FetchObserver for NoopObserver {}

/// Fetches single-commit patches and concatenates them.
#[derive(Debug)]
pub struct PatchAssembler<'a, R: ?Sized> {
    git: Git<'a, R>,
}

impl<'a, R: ProcessRunner + ?Sized> PatchAssembler<'a, R> {
    /// Creates an assembler that fetches through `git`.
    pub fn new(git: Git<'a, R>) -> Self {
        Self { git }
    }

    /// Fetches every commit strictly in order. Fails on the first commit that
    /// cannot be fetched, discarding everything fetched before it.
    pub fn assemble(
        &self,
        dir: &Path,
        commits: &[CommitId],
        observer: &dyn FetchObserver,
    ) -> Result<PatchDocument, FetchError> {
        info!(count = commits.len(), "fetching commit patches");
        observer.started(commits.len());

        let mut document = PatchDocument::default();

        for (index, commit) in commits.iter().enumerate() {
            let block = self.fetch(dir, commit)?;
            debug!(commit = %commit, bytes = block.len(), "fetched commit patch");
            document.push_block(commit.clone(), &block);
            observer.fetched(index, commit);
        }

        Ok(document)
    }

    /// Fetches one commit's patch with zero context lines.
    pub fn fetch(&self, dir: &Path, commit: &CommitId) -> Result<Vec<u8>, FetchError> {
        let invocation = self.git.command(dir).args(["show", "-p", "-U0"]).arg(commit);

        self.git.run(&invocation).map_err(|source| FetchError {
            commit: commit.clone(),
            source,
        })
    }
}

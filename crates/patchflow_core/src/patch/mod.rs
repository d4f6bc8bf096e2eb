//! Streaming parser for git's patch format.
//!
//! Handles the output of `git log -p`, `git show -p` and `git diff`, turning
//! each `diff --git` section into a [`FileChange`] attributed to the commit
//! header that precedes it.

mod parser;
mod path;
mod types;

pub use parser::{ParseError, PatchParser};
pub use types::{ChangeKind, CommitHeader, FileChange, Hunk, HunkLine, LineOp};

//! Convenience re-exports of the most commonly used types.

pub use crate::acquire::{Acquirer, HistoryOptions, PatchStream};
pub use crate::config::{Config, ConfigError};
pub use crate::diagnostics::DiagnosticRules;
pub use crate::error::AcquireError;
pub use crate::patch::{ChangeKind, CommitHeader, FileChange, Hunk};
pub use crate::resolve::{CommitId, RangeSpec};

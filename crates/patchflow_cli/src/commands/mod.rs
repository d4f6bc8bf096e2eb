//! CLI command handlers.

/// Shared configuration and acquirer setup.
pub mod context;
/// Working-tree diff streaming.
pub mod diff;
/// History, merge/pull request and commit-list streaming.
pub mod history;
/// Rendering of streamed file changes.
pub mod output;

/// Convenience alias for command return types.
pub type Result<T = ()> = anyhow::Result<T>;

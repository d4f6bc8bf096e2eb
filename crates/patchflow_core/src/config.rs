use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::acquire::HistoryOptions;
use crate::diagnostics::DiagnosticRules;
use crate::process::DEFAULT_GIT_BINARY;
use crate::resolve::RangeSpec;

/// Project-level configuration loaded from `.patchflow.toml`.
///
/// Every field is optional. An empty or missing file means: run `git` from
/// `PATH`, scan the full history, and treat only rename-limit notices as
/// ignorable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Path to the git executable.
    #[serde(default)]
    pub git_binary: Option<String>,

    /// History acquisition defaults.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Extra stderr rules.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// The `[history]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Options for `git log -p -U0`, replacing `--full-history --all`.
    #[serde(default)]
    pub log_opts: Option<String>,

    /// Source branch of a merge/pull request comparison.
    #[serde(default)]
    pub source_branch: Option<String>,

    /// Target branch of a merge/pull request comparison.
    #[serde(default)]
    pub target_branch: Option<String>,

    /// File listing commits to scan, relative to the current directory.
    #[serde(default)]
    pub commits_file: Option<PathBuf>,
}

/// The `[diagnostics]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Additional stderr substrings to treat as warnings rather than failures.
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl Config {
    /// Creates a default configuration with no overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a `.patchflow.toml` file.
    ///
    /// Returns the default configuration if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = read_file(path)?;
        parse_toml(path, &content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        parse_toml(Path::new("<inline>"), content)
    }

    /// The git executable to run.
    #[must_use]
    pub fn git_binary(&self) -> PathBuf {
        PathBuf::from(self.git_binary.as_deref().unwrap_or(DEFAULT_GIT_BINARY))
    }

    /// Default stderr rules extended with `[diagnostics] ignore`.
    #[must_use]
    pub fn rules(&self) -> DiagnosticRules {
        DiagnosticRules::with_extra(&self.diagnostics.ignore)
    }

    /// History options from the `[history]` table. A branch pair with either
    /// side missing is dropped.
    #[must_use]
    pub fn history_options(&self) -> HistoryOptions {
        let history = &self.history;

        HistoryOptions {
            log_opts: history.log_opts.clone(),
            range: RangeSpec::from_branches(history.source_branch.as_deref(), history.target_branch.as_deref()),
            commits_file: history.commits_file.clone(),
        }
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_toml(path: &Path, content: &str) -> Result<Config, ConfigError> {
    toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Errors that can occur when reading or parsing a `.patchflow.toml` file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read from disk.
    #[error("failed to read config '{path}': {source}")]
    Read {
        /// Path to the config file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file contained invalid TOML or unexpected values.
    #[error("failed to parse config '{path}': {source}")]
    Parse {
        /// Path to the config file that could not be parsed.
        path: PathBuf,
        /// The underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    /// Returns the file path associated with this error.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } => path,
        }
    }
}

#[cfg(test)]
#[expect(clippy::expect_used, reason = "tests use expect for clearer failure messages")]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::diagnostics::Classification;

    const FULL: &str = r#"
git_binary = "/usr/local/bin/git"

[history]
log_opts = "--since=2024-01-01"
source_branch = "feature"
target_branch = "main"
commits_file = "commits.txt"

[diagnostics]
ignore = ["warning: refname"]
"#;

    #[test]
    fn default_config_runs_git_from_path() {
        let config = Config::default();
        assert_eq!(config.git_binary(), PathBuf::from("git"));
        assert_eq!(config.history_options(), HistoryOptions::default());
    }

    #[test]
    fn from_toml_returns_defaults_for_empty_string() {
        let config = Config::from_toml("").expect("parse");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn from_toml_parses_all_fields() {
        let config = Config::from_toml(FULL).expect("parse");

        assert_eq!(config.git_binary(), PathBuf::from("/usr/local/bin/git"));

        let options = config.history_options();
        assert_eq!(options.log_opts.as_deref(), Some("--since=2024-01-01"));
        assert_eq!(
            options.range.as_ref().map(RangeSpec::revision_range).as_deref(),
            Some("main..feature")
        );
        assert_eq!(options.commits_file, Some(PathBuf::from("commits.txt")));
    }

    #[test]
    fn half_configured_branch_pair_is_dropped() {
        let config = Config::from_toml("[history]\nsource_branch = \"feature\"\n").expect("parse");
        assert!(config.history_options().range.is_none());
    }

    #[test]
    fn extra_ignore_rules_extend_defaults() {
        let config = Config::from_toml(FULL).expect("parse");
        let rules = config.rules();

        assert_eq!(
            rules.classify("warning: refname 'HEAD' is ambiguous."),
            Classification::Ignorable
        );
        assert_eq!(
            rules.classify("warning: inexact rename detection was skipped due to too many files."),
            Classification::Ignorable
        );
        assert_eq!(rules.classify("fatal: not a git repository"), Classification::Fatal);
    }

    #[test]
    fn from_toml_rejects_malformed_toml_syntax() {
        assert!(Config::from_toml("this is { not valid toml").is_err());
    }

    #[test]
    fn from_toml_rejects_wrong_types() {
        assert!(Config::from_toml("[diagnostics]\nignore = \"not a list\"\n").is_err());
    }

    #[test]
    fn load_returns_default_config_when_file_not_found() {
        let config = Config::load(Path::new("/nonexistent/path/.patchflow.toml")).expect("load");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_parses_existing_config_file() {
        let mut file = NamedTempFile::new().expect("tempfile");
        writeln!(file, "[history]\nlog_opts = \"-n 5\"").expect("write");

        let config = Config::load(file.path()).expect("load");
        assert_eq!(config.history.log_opts.as_deref(), Some("-n 5"));
    }

    #[test]
    fn parse_error_includes_path() {
        let mut file = NamedTempFile::new().expect("tempfile");
        writeln!(file, "git_binary = [").expect("write");

        let error = Config::load(file.path()).expect_err("should fail");
        assert_eq!(error.path(), file.path());
        assert!(error.to_string().contains(&file.path().display().to_string()));
    }
}

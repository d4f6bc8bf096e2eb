//! Command context - configuration loading and acquirer setup.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use patchflow_core::CONFIG_FILENAME;
use patchflow_core::prelude::*;
use tracing::debug;

use crate::CommonArgs;

/// Loaded configuration and a ready acquirer for one command run.
#[derive(Debug)]
pub struct CommandContext {
    /// Repository directory every git command is scoped to.
    pub repo: PathBuf,
    /// Parsed configuration from `.patchflow.toml`.
    pub config: Config,
    /// Acquirer using the effective git binary and diagnostic rules.
    pub acquirer: Acquirer,
}

impl CommandContext {
    /// Loads configuration and builds the acquirer, CLI flags taking
    /// precedence over config values.
    pub fn load(args: &CommonArgs) -> anyhow::Result<Self> {
        let config_path = config_path(args.config.as_deref(), &args.repo);
        let config = Config::load(&config_path).context("loading config")?;
        debug!(path = %config_path.display(), "configuration loaded");

        let git_binary = args.git.clone().unwrap_or_else(|| config.git_binary());
        let acquirer = Acquirer::new().with_git_binary(git_binary).with_rules(config.rules());

        Ok(Self {
            repo: args.repo.clone(),
            config,
            acquirer,
        })
    }
}

/// An explicit `--config` path, otherwise `.patchflow.toml` in the repository.
fn config_path(explicit: Option<&Path>, repo: &Path) -> PathBuf {
    explicit.map_or_else(|| repo.join(CONFIG_FILENAME), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_repository_root() {
        assert_eq!(
            config_path(None, Path::new("/work/repo")),
            PathBuf::from("/work/repo/.patchflow.toml")
        );
    }

    #[test]
    fn explicit_config_path_wins() {
        assert_eq!(
            config_path(Some(Path::new("ci/patchflow.toml")), Path::new("/work/repo")),
            PathBuf::from("ci/patchflow.toml")
        );
    }
}

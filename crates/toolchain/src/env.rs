//! Process Environment
//!
//! The search path and extra variables handed to every external command.
//! Nothing here touches the environment of the running process; the value is
//! threaded through each step and applied per command.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::host::CommandSpec;

/// Environment configuration
#[derive(Debug, Clone, Default)]
pub struct EnvironmentConfig {
    /// Directories searched before the inherited PATH, first wins
    pub path_additions: Vec<PathBuf>,
    /// Custom environment variables
    pub custom_vars: BTreeMap<String, String>,
}

/// Environment for child processes
#[derive(Debug, Clone)]
pub struct ProcessEnv {
    config: EnvironmentConfig,
    base_path: String,
}

impl ProcessEnv {
    /// Start from the PATH this process was started with
    pub fn inherit() -> Self {
        let base_path = std::env::var_os("PATH")
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::with_base_path(base_path)
    }

    /// Start from an explicit PATH
    pub fn with_base_path(base_path: impl Into<String>) -> Self {
        Self {
            config: EnvironmentConfig::default(),
            base_path: base_path.into(),
        }
    }

    /// Put `dir` in front of every directory already on the search path
    pub fn prepend_path(&mut self, dir: PathBuf) {
        self.config.path_additions.retain(|p| p != &dir);
        info!("Prepending {:?} to PATH", dir);
        self.config.path_additions.insert(0, dir);
    }

    /// Add custom environment variable
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config.custom_vars.insert(key.into(), value.into());
    }

    pub fn path_additions(&self) -> &[PathBuf] {
        &self.config.path_additions
    }

    /// Get PATH value including additions
    pub fn get_path(&self) -> String {
        let path_sep = if cfg!(windows) { ";" } else { ":" };

        let mut parts: Vec<String> = self
            .config
            .path_additions
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();

        if !self.base_path.is_empty() {
            parts.push(self.base_path.clone());
        }

        parts.join(path_sep)
    }

    /// Variables to set on a child, PATH included
    pub fn command_env(&self) -> BTreeMap<String, String> {
        let mut env = self.config.custom_vars.clone();
        let path_key = if cfg!(windows) { "Path" } else { "PATH" };
        env.insert(path_key.to_string(), self.get_path());
        env
    }

    /// A command that runs under this environment
    pub fn command(&self, program: impl Into<String>) -> CommandSpec {
        self.command_env()
            .into_iter()
            .fold(CommandSpec::new(program), |cmd, (key, value)| cmd.env(key, value))
    }

    /// Locate `program` the way a child process would see it
    pub fn resolve(&self, program: &str, cwd: &Path) -> Option<PathBuf> {
        let found = which::which_in(program, Some(self.get_path()), cwd).ok();
        debug!("Resolved {} to {:?}", program, found);
        found
    }
}

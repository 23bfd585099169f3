//! CLI commands for xndk
//!
//! The bootstrap command wires the orchestrator to the real host; the
//! delegate build hands control to the project's own build driver.

use std::ffi::OsString;
use std::path::PathBuf;
use tracing::info;

use xndk_core::{BootstrapConfig, BootstrapError, Result, TargetArch};
use xndk_toolchain::{
    CommandRunner, DownloadConfig, LocalFs, ProcessEnv, ProvisionOutcome, SystemRunner,
    ToolchainDownloader,
};

use crate::orchestrator::Bootstrap;

/// The project's build driver, run after provisioning
pub struct DelegateBuild {
    project_root: PathBuf,
    script: PathBuf,
}

impl DelegateBuild {
    pub fn new(config: &BootstrapConfig) -> Self {
        Self {
            project_root: config.paths.project_root.clone(),
            script: config.paths.project_root.join(&config.delegate.script),
        }
    }

    /// Run the driver in the project root with `args` passed through untouched
    pub async fn run<R: CommandRunner>(
        &self,
        runner: &R,
        env: &ProcessEnv,
        args: &[OsString],
    ) -> Result<()> {
        info!("Running {:?} in {:?}", self.script, self.project_root);

        let cmd = env
            .command(self.script.to_string_lossy())
            .args(args.iter().cloned())
            .current_dir(&self.project_root);

        match xndk_toolchain::host::run_checked(runner, &cmd).await {
            Err(BootstrapError::CommandFailed { code, .. }) => {
                Err(BootstrapError::DelegateFailed { code })
            }
            other => other,
        }
    }
}

/// Full bootstrap against the local machine
pub struct BootstrapCommand {
    pub config: BootstrapConfig,
    pub arch: TargetArch,
    /// Forwarded to the delegate build
    pub args: Vec<OsString>,
}

impl BootstrapCommand {
    /// Build from the process environment and command line
    pub async fn from_env() -> Result<Self> {
        let config = BootstrapConfig::load().await?;
        let arch = TargetArch::from_env();
        let args = std::env::args_os().skip(1).collect();

        Ok(Self { config, arch, args })
    }

    /// Execute the bootstrap
    pub async fn execute(self) -> Result<ProvisionOutcome> {
        info!("Bootstrapping macOS cross toolchain for {}", self.arch);

        let fetcher = ToolchainDownloader::new(DownloadConfig::default())?;
        let bootstrap = Bootstrap::new(self.config, self.arch, SystemRunner, fetcher, LocalFs);
        let outcome = bootstrap.run(&self.args).await?;

        info!("Bootstrap finished ({:?})", outcome);
        Ok(outcome)
    }
}

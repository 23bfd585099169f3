//! Bootstrap Orchestrator
//!
//! Runs the provisioning steps in order and stops at the first failure:
//! host packages, CMake pin, cross toolchain, then the delegate build.

use std::ffi::OsString;
use tracing::info;

use xndk_core::{BootstrapConfig, Result, TargetArch};
use xndk_toolchain::{
    ArtifactFetcher, CmakePinner, CommandRunner, Filesystem, NdkProvisioner, PackageInstaller,
    ProcessEnv, ProvisionOutcome,
};

use crate::commands::DelegateBuild;

/// Stages of a bootstrap run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Packages,
    Cmake,
    Toolchain,
    Delegate,
}

/// One full bootstrap run over a set of host collaborators
pub struct Bootstrap<R, F, S> {
    config: BootstrapConfig,
    arch: TargetArch,
    runner: R,
    fetcher: F,
    fs: S,
    env: ProcessEnv,
}

impl<R, F, S> Bootstrap<R, F, S>
where
    R: CommandRunner,
    F: ArtifactFetcher,
    S: Filesystem,
{
    pub fn new(config: BootstrapConfig, arch: TargetArch, runner: R, fetcher: F, fs: S) -> Self {
        Self {
            config,
            arch,
            runner,
            fetcher,
            fs,
            env: ProcessEnv::inherit(),
        }
    }

    /// Use `env` as the starting environment instead of the inherited one
    pub fn with_env(mut self, env: ProcessEnv) -> Self {
        self.env = env;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn fs(&self) -> &S {
        &self.fs
    }

    /// Provision everything, then hand `args` to the delegate build
    pub async fn run(&self, args: &[OsString]) -> Result<ProvisionOutcome> {
        let mut env = self.env.clone();

        info!("[{:?}] installing host packages", Stage::Packages);
        PackageInstaller::new(self.config.packages.clone())
            .install(&self.runner, &env)
            .await?;

        info!("[{:?}] pinning CMake {}", Stage::Cmake, self.config.cmake.version);
        CmakePinner::new(self.config.cmake.clone())
            .pin(&self.fetcher, &self.fs, &mut env)
            .await?;

        info!("[{:?}] provisioning toolchain for {}", Stage::Toolchain, self.arch);
        let outcome = NdkProvisioner::new(&self.config, self.arch.clone())
            .provision(&self.runner, &self.fetcher, &self.fs, &env)
            .await?;

        info!("[{:?}] running {:?}", Stage::Delegate, self.config.delegate.script);
        DelegateBuild::new(&self.config)
            .run(&self.runner, &env, args)
            .await?;

        Ok(outcome)
    }
}

//! NDK Provisioner
//!
//! Makes sure the macOS cross toolchain for the target architecture exists.
//!
//! For `x86_64` the toolchain lives in an architecture-qualified directory.
//! When its binary directory is missing, the staged toolchain tree is copied
//! there. A staged tree normally ships prebuilt binaries, so the copy alone
//! is expected to make the binary directory appear; fetching the macOS SDK
//! and running the toolchain's own build is the fallback for a tree that
//! only carries sources.
//!
//! Other architectures have no provisioning path here and are assumed to
//! come with their toolchain installed.

use std::path::PathBuf;
use tracing::{debug, info, warn};

use xndk_core::config::SdkConfig;
use xndk_core::{BootstrapConfig, BootstrapError, Result, TargetArch};

use crate::env::ProcessEnv;
use crate::host::{run_checked, ArtifactFetcher, ArtifactSource, CommandRunner, Filesystem};

/// Written into the toolchain root once a relocation copy has been verified
pub const RELOCATION_MARKER: &str = ".xndk-relocated";

/// Written into the toolchain root once the relocated tree is known to be usable,
/// either straight after the copy or after a successful build
pub const COMPLETE_MARKER: &str = ".xndk-complete";

/// Toolchain build script, relative to the toolchain root
pub const BUILD_SCRIPT: &str = "build.sh";

/// Where provisioning stands before anything is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    UnknownArch,
    SupportedArchPresent,
    SupportedArchMissing,
}

/// What provisioning ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Architecture without a provisioning path
    Skipped,
    /// Toolchain was already there
    AlreadyPresent,
    /// Copying the staged tree was enough
    Relocated,
    /// SDK fetched and toolchain built
    Built,
}

pub struct NdkProvisioner {
    arch: TargetArch,
    staged_source: PathBuf,
    toolchain_root: PathBuf,
    bin_dir: PathBuf,
    sdk: SdkConfig,
}

impl NdkProvisioner {
    pub fn new(config: &BootstrapConfig, arch: TargetArch) -> Self {
        Self {
            staged_source: config.paths.staged_toolchain.clone(),
            toolchain_root: config.toolchain_root(&arch),
            bin_dir: config.toolchain_bin(&arch),
            sdk: config.sdk.clone(),
            arch,
        }
    }

    pub fn toolchain_root(&self) -> &PathBuf {
        &self.toolchain_root
    }

    pub fn bin_dir(&self) -> &PathBuf {
        &self.bin_dir
    }

    fn marker_path(&self) -> PathBuf {
        self.toolchain_root.join(RELOCATION_MARKER)
    }

    fn complete_marker_path(&self) -> PathBuf {
        self.toolchain_root.join(COMPLETE_MARKER)
    }

    /// Classify the current state without touching anything.
    ///
    /// A toolchain this tool relocated only counts once it was marked
    /// complete, so binaries left behind by a failed build are not trusted.
    pub async fn state<S: Filesystem>(&self, fs: &S) -> ProvisionState {
        match self.arch {
            TargetArch::Other(_) => ProvisionState::UnknownArch,
            TargetArch::X86_64 => {
                if !fs.is_populated(&self.bin_dir).await {
                    return ProvisionState::SupportedArchMissing;
                }
                if fs.exists(&self.marker_path()).await
                    && !fs.exists(&self.complete_marker_path()).await
                {
                    warn!("{:?} was never completed, treating it as missing", self.toolchain_root);
                    return ProvisionState::SupportedArchMissing;
                }
                ProvisionState::SupportedArchPresent
            }
        }
    }

    /// Bring the toolchain into place for the target architecture
    pub async fn provision<R, F, S>(
        &self,
        runner: &R,
        fetcher: &F,
        fs: &S,
        env: &ProcessEnv,
    ) -> Result<ProvisionOutcome>
    where
        R: CommandRunner,
        F: ArtifactFetcher,
        S: Filesystem,
    {
        match self.state(fs).await {
            ProvisionState::UnknownArch => {
                info!(
                    "No toolchain provisioning for architecture {}, assuming it is installed",
                    self.arch
                );
                return Ok(ProvisionOutcome::Skipped);
            }
            ProvisionState::SupportedArchPresent => {
                info!("Found {} toolchain at {:?}", self.arch, self.bin_dir);
                self.log_listing(fs).await;
                return Ok(ProvisionOutcome::AlreadyPresent);
            }
            ProvisionState::SupportedArchMissing => {
                info!("{} toolchain not found at {:?}", self.arch, self.bin_dir);
            }
        }

        let copied = self.relocate(fs).await?;

        // a reused copy with binaries but no completion marker is a failed build
        if copied && fs.is_populated(&self.bin_dir).await {
            info!("Relocated toolchain is complete, no build needed");
            self.mark_complete(fs).await?;
            self.log_listing(fs).await;
            return Ok(ProvisionOutcome::Relocated);
        }

        self.fetch_sdk(fetcher, fs).await?;
        self.build(runner, env).await?;

        if !fs.is_populated(&self.bin_dir).await {
            return Err(BootstrapError::ToolchainIncomplete(self.bin_dir.clone()));
        }

        self.mark_complete(fs).await?;
        info!("{} toolchain built", self.arch);
        self.log_listing(fs).await;
        Ok(ProvisionOutcome::Built)
    }

    /// Copy the staged tree into the toolchain root.
    ///
    /// Returns whether a copy happened. Safe to repeat: a verified earlier
    /// copy is reused, a partial one is discarded and redone, and the staged
    /// tree is left in place.
    pub async fn relocate<S: Filesystem>(&self, fs: &S) -> Result<bool> {
        if self.staged_source.starts_with(&self.toolchain_root)
            || self.toolchain_root.starts_with(&self.staged_source)
        {
            return Err(BootstrapError::Config(format!(
                "toolchain root {:?} overlaps staged toolchain {:?}",
                self.toolchain_root, self.staged_source
            )));
        }

        let marker = self.marker_path();

        if fs.exists(&marker).await {
            debug!("{:?} already relocated", self.toolchain_root);
            return Ok(false);
        }

        if !fs.exists(&self.staged_source).await {
            return Err(BootstrapError::StagedSourceMissing(self.staged_source.clone()));
        }

        if fs.exists(&self.toolchain_root).await {
            warn!("Discarding incomplete toolchain at {:?}", self.toolchain_root);
            fs.remove_tree(&self.toolchain_root).await?;
        }

        let expected = fs.count_entries(&self.staged_source).await?;
        info!(
            "Copying {:?} to {:?} ({} entries)",
            self.staged_source, self.toolchain_root, expected
        );
        let copied = fs.copy_tree(&self.staged_source, &self.toolchain_root).await?;

        if copied != expected {
            return Err(BootstrapError::RelocationIncomplete {
                from: self.staged_source.clone(),
                to: self.toolchain_root.clone(),
                copied,
                expected,
            });
        }

        fs.write_file(&marker, &format!("{}\n", copied)).await?;
        Ok(true)
    }

    async fn mark_complete<S: Filesystem>(&self, fs: &S) -> Result<()> {
        fs.write_file(&self.complete_marker_path(), &format!("{}\n", self.arch))
            .await?;
        Ok(())
    }

    async fn fetch_sdk<F: ArtifactFetcher, S: Filesystem>(&self, fetcher: &F, fs: &S) -> Result<()> {
        let dest = self.toolchain_root.join("tarballs").join(&self.sdk.file_name);
        if fs.exists(&dest).await {
            info!("Skipping already downloaded {}", self.sdk.file_name);
            return Ok(());
        }

        let file_id = self.sdk.file_id.clone().ok_or_else(|| {
            BootstrapError::Config(format!(
                "macOS SDK file id not configured (set ${} or sdk.file_id)",
                xndk_core::config::SDK_FILE_ID_ENV
            ))
        })?;

        info!("Fetching macOS SDK {}", self.sdk.file_name);

        let source = ArtifactSource::ConfirmToken {
            endpoint: self.sdk.endpoint.clone(),
            file_id,
        };
        fetcher.fetch(&source, &dest).await?;
        Ok(())
    }

    async fn build<R: CommandRunner>(&self, runner: &R, env: &ProcessEnv) -> Result<()> {
        info!("Building {} toolchain in {:?}", self.arch, self.toolchain_root);

        let script = self.toolchain_root.join(BUILD_SCRIPT);
        let cmd = env
            .command(script.to_string_lossy())
            .current_dir(&self.toolchain_root)
            .env("UNATTENDED", "1");
        run_checked(runner, &cmd).await
    }

    async fn log_listing<S: Filesystem>(&self, fs: &S) {
        match fs.list_dir(&self.bin_dir).await {
            Ok(entries) => info!("{}: {}", self.bin_dir.display(), entries.join(" ")),
            Err(e) => warn!("Cannot list {:?}: {}", self.bin_dir, e),
        }
    }
}

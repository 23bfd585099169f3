//! macOS Cross Toolchain Management
//!
//! Handles provisioning of:
//! - Host packages
//! - A pinned CMake release
//! - The macOS cross toolchain (NDK) and its SDK
//!
//! All host access goes through the traits in [`host`].

pub mod cmake;
pub mod downloader;
pub mod env;
pub mod host;
pub mod ndk;
pub mod packages;

pub use cmake::CmakePinner;
pub use downloader::{DownloadConfig, DownloadError, ToolchainDownloader};
pub use env::{EnvironmentConfig, ProcessEnv};
pub use host::{
    ArtifactFetcher, ArtifactSource, CommandRunner, CommandSpec, Filesystem, LocalFs, SystemRunner,
};
pub use ndk::{NdkProvisioner, ProvisionOutcome, ProvisionState};
pub use packages::PackageInstaller;

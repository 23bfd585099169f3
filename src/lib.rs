//! xndk - macOS cross toolchain bootstrap
//!
//! Prepares a Linux host for building macOS binaries and then runs the
//! project's own build:
//!
//! 1. Install host packages
//! 2. Pin a CMake release at the front of the search path
//! 3. Provision the macOS cross toolchain (NDK) for the target architecture
//! 4. Run the project's build driver with the original arguments
//!
//! ## Architecture
//!
//! - `xndk-core`: configuration, target architecture, errors
//! - `xndk-toolchain`: host seams, downloads, and the provisioning steps

#![warn(clippy::all)]

pub mod commands;
pub mod orchestrator;

// Re-export main components for library usage
pub use xndk_core as core;
pub use xndk_toolchain as toolchain;

/// Prelude module for convenient imports
pub mod prelude {
    pub use xndk_core::{BootstrapConfig, BootstrapError, TargetArch};
    pub use xndk_toolchain::{NdkProvisioner, ProcessEnv, ProvisionOutcome};
    pub use crate::commands::{BootstrapCommand, DelegateBuild};
    pub use crate::orchestrator::Bootstrap;
}

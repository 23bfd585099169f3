//! xndk Core - configuration and shared types
//!
//! This crate holds what every bootstrap step shares: the configuration
//! model, the target architecture selector and the error type.

pub mod arch;
pub mod config;
pub mod error;

pub use arch::TargetArch;
pub use config::BootstrapConfig;
pub use error::{BootstrapError, Result};

/// xndk version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "xndk";

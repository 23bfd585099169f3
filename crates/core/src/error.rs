//! Error types for xndk
//!
//! Centralized error handling using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for xndk
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Checksum mismatch for {0}")]
    ChecksumMismatch(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}", describe_code(*code))]
    CommandFailed { program: String, code: Option<i32> },

    #[error("Staged toolchain source not found at {0:?}")]
    StagedSourceMissing(PathBuf),

    #[error("Relocation of {from:?} to {to:?} is incomplete: copied {copied} of {expected} entries")]
    RelocationIncomplete {
        from: PathBuf,
        to: PathBuf,
        copied: u64,
        expected: u64,
    },

    #[error("Toolchain binaries missing at {0:?} after build")]
    ToolchainIncomplete(PathBuf),

    #[error("Delegate build failed with {}", describe_code(*code))]
    DelegateFailed { code: Option<i32> },
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

/// Result type alias for xndk operations
pub type Result<T> = std::result::Result<T, BootstrapError>;

impl BootstrapError {
    /// Exit code the process should terminate with
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapError::CommandFailed { code: Some(code), .. }
            | BootstrapError::DelegateFailed { code: Some(code) } if *code != 0 => *code,
            _ => 1,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            BootstrapError::Io(e) => format!("File operation failed: {}", e),
            BootstrapError::Config(msg) => format!("Configuration error: {}", msg),
            BootstrapError::Download(msg) => {
                format!("Download failed: {}. Please check your connection.", msg)
            }
            BootstrapError::StagedSourceMissing(path) => format!(
                "No staged cross-toolchain at {:?} and no previous relocation to reuse",
                path
            ),
            _ => self.to_string(),
        }
    }
}

//! Bootstrap Configuration
//!
//! Fixed paths, pinned versions and endpoints used by the bootstrap:
//! - Host package list
//! - CMake pin
//! - Cross-toolchain locations
//! - macOS SDK source
//! - Delegate build driver

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{info, debug};

use crate::arch::TargetArch;
use crate::error::{BootstrapError, Result};

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "XNDK_CONFIG";

/// Environment variable overriding the SDK file id
pub const SDK_FILE_ID_ENV: &str = "MACOS_SDK_FILE_ID";

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Project root the delegate build runs in
    pub project_root: PathBuf,
    /// Staged cross-toolchain source tree
    pub staged_toolchain: PathBuf,
    /// Architecture-qualified toolchain directory, `{arch}` is substituted
    pub toolchain_root: String,
    /// Binary directory, relative to the toolchain root
    pub toolchain_bin: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("/python3-android"),
            staged_toolchain: PathBuf::from("/opt/cross-toolchain"),
            toolchain_root: "/opt/cross-toolchain-{arch}".to_string(),
            toolchain_bin: PathBuf::from("target").join("bin"),
        }
    }
}

/// Host package installation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagesConfig {
    /// Package manager executable
    pub manager: String,
    /// Packages to install
    pub packages: Vec<String>,
}

impl Default for PackagesConfig {
    fn default() -> Self {
        let packages = [
            "bash", "bzip2", "clang", "cmake", "cpio", "curl", "file", "git", "gzip",
            "libbz2-dev", "libssl-dev", "libxml2-dev", "llvm-dev", "make", "patch",
            "python3", "sed", "tar", "uuid-dev", "xz-utils", "zlib1g-dev",
        ];

        Self {
            manager: "apt-get".to_string(),
            packages: packages.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// CMake pin
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CmakeConfig {
    /// Pinned release
    pub version: String,
    /// Extraction target
    pub install_root: PathBuf,
    /// Expected SHA-256 of the release archive
    pub sha256: Option<String>,
}

impl Default for CmakeConfig {
    fn default() -> Self {
        Self {
            version: "3.27.7".to_string(),
            install_root: PathBuf::from("/opt"),
            sha256: None,
        }
    }
}

impl CmakeConfig {
    /// Release directory name, as laid out inside the archive
    pub fn dist_name(&self) -> String {
        format!("cmake-{}-linux-x86_64", self.version)
    }

    pub fn url(&self) -> String {
        format!(
            "https://github.com/Kitware/CMake/releases/download/v{}/{}.tar.gz",
            self.version,
            self.dist_name()
        )
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.install_root.join(self.dist_name()).join("bin")
    }
}

/// macOS SDK archive source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// File-hosting download endpoint
    pub endpoint: String,
    /// Hosted file id
    pub file_id: Option<String>,
    /// Archive name inside the toolchain's tarball directory
    pub file_name: String,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://docs.google.com/uc?export=download".to_string(),
            file_id: None,
            file_name: "MacOSX10.15.sdk.tar.xz".to_string(),
        }
    }
}

/// Delegate build driver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegateConfig {
    /// Driver script, relative to the project root
    pub script: PathBuf,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            script: PathBuf::from("build.sh"),
        }
    }
}

/// Main bootstrap configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub paths: PathsConfig,
    pub packages: PackagesConfig,
    pub cmake: CmakeConfig,
    pub sdk: SdkConfig,
    pub delegate: DelegateConfig,
}

impl BootstrapConfig {
    /// Default configuration file location
    pub fn config_file() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("xndk").join("config.toml"))
    }

    /// Load configuration from `$XNDK_CONFIG`, the default location, or defaults
    pub async fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_from(Path::new(&path)).await?,
            None => match Self::config_file() {
                Some(path) if path.exists() => Self::load_from(&path).await?,
                _ => {
                    info!("No configuration file, using defaults");
                    Self::default()
                }
            },
        };

        if let Ok(file_id) = std::env::var(SDK_FILE_ID_ENV) {
            if !file_id.is_empty() {
                debug!("SDK file id taken from ${}", SDK_FILE_ID_ENV);
                config.sdk.file_id = Some(file_id);
            }
        }

        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            BootstrapError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Architecture-qualified toolchain directory
    pub fn toolchain_root(&self, arch: &TargetArch) -> PathBuf {
        PathBuf::from(self.paths.toolchain_root.replace("{arch}", arch.as_str()))
    }

    /// Binary directory whose contents signal a provisioned toolchain
    pub fn toolchain_bin(&self, arch: &TargetArch) -> PathBuf {
        self.toolchain_root(arch).join(&self.paths.toolchain_bin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BootstrapConfig::default();
        assert_eq!(config.packages.manager, "apt-get");
        assert!(config.packages.packages.iter().any(|p| p == "libxml2-dev"));
        assert_eq!(config.delegate.script, PathBuf::from("build.sh"));
        assert!(config.sdk.file_id.is_none());
    }

    #[test]
    fn test_cmake_paths() {
        let cmake = CmakeConfig::default();
        assert_eq!(
            cmake.url(),
            "https://github.com/Kitware/CMake/releases/download/v3.27.7/cmake-3.27.7-linux-x86_64.tar.gz"
        );
        assert_eq!(cmake.bin_dir(), PathBuf::from("/opt/cmake-3.27.7-linux-x86_64/bin"));
    }

    #[test]
    fn test_toolchain_paths() {
        let config = BootstrapConfig::default();
        assert_eq!(
            config.toolchain_root(&TargetArch::X86_64),
            PathBuf::from("/opt/cross-toolchain-x86_64")
        );
        assert_eq!(
            config.toolchain_bin(&TargetArch::X86_64),
            PathBuf::from("/opt/cross-toolchain-x86_64/target/bin")
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = BootstrapConfig::parse(
            r#"
            [cmake]
            version = "3.28.1"

            [sdk]
            file_id = "abc123"
            "#,
        )
        .unwrap();

        assert_eq!(config.cmake.version, "3.28.1");
        assert_eq!(config.cmake.install_root, PathBuf::from("/opt"));
        assert_eq!(config.sdk.file_id.as_deref(), Some("abc123"));
        assert_eq!(config.paths.project_root, PathBuf::from("/python3-android"));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            BootstrapConfig::parse("[cmake\nversion = 1"),
            Err(BootstrapError::TomlParse(_))
        ));
    }

    #[tokio::test]
    async fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = BootstrapConfig::load_from(&dir.path().join("nope.toml")).await;
        assert!(matches!(result, Err(BootstrapError::Config(_))));
    }
}

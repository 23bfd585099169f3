//! CMake Pinner
//!
//! Installs a fixed CMake release next to whatever the host ships and puts
//! it first on the search path, so the cross toolchain build never picks up
//! an older system CMake.

use std::path::PathBuf;
use tracing::{info, warn};

use xndk_core::config::CmakeConfig;
use xndk_core::{BootstrapError, Result};

use crate::env::ProcessEnv;
use crate::host::{ArtifactFetcher, ArtifactSource, Filesystem};

pub struct CmakePinner {
    config: CmakeConfig,
}

impl CmakePinner {
    pub fn new(config: CmakeConfig) -> Self {
        Self { config }
    }

    fn archive_path(&self) -> PathBuf {
        self.config
            .install_root
            .join(format!("{}.tar.gz", self.config.dist_name()))
    }

    /// Make sure the pinned release is unpacked and prepend its `bin` to `env`
    pub async fn pin<F, S>(&self, fetcher: &F, fs: &S, env: &mut ProcessEnv) -> Result<PathBuf>
    where
        F: ArtifactFetcher,
        S: Filesystem,
    {
        let bin_dir = self.config.bin_dir();
        let cmake = bin_dir.join("cmake");

        if fs.exists(&cmake).await {
            info!("CMake {} already installed at {:?}", self.config.version, bin_dir);
        } else {
            self.install(fetcher, fs).await?;

            if !fs.exists(&cmake).await {
                return Err(BootstrapError::Extraction(format!(
                    "{} not found after unpacking CMake {}",
                    cmake.display(),
                    self.config.version
                )));
            }
        }

        env.prepend_path(bin_dir.clone());
        Ok(bin_dir)
    }

    async fn install<F, S>(&self, fetcher: &F, fs: &S) -> Result<()>
    where
        F: ArtifactFetcher,
        S: Filesystem,
    {
        let url = self.config.url();
        let archive = self.archive_path();

        info!("Fetching CMake {}", self.config.version);
        fetcher.fetch(&ArtifactSource::direct(url.as_str()), &archive).await?;

        if let Some(ref expected) = self.config.sha256 {
            let actual = fs.sha256(&archive).await?;
            if !actual.eq_ignore_ascii_case(expected) {
                warn!("Checksum mismatch: expected {}, got {}", expected, actual);
                fs.remove_file(&archive).await?;
                return Err(BootstrapError::ChecksumMismatch(url));
            }
        }

        fs.unpack_tar_gz(&archive, &self.config.install_root).await?;
        fs.remove_file(&archive).await?;

        info!("CMake {} installed to {:?}", self.config.version, self.config.install_root);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use crate::downloader::DownloadError;
    use crate::host::LocalFs;

    /// Serves a prepared archive for any direct URL
    struct ArchiveFetcher {
        archive: PathBuf,
        fetched: std::cell::Cell<u32>,
    }

    impl ArtifactFetcher for ArchiveFetcher {
        async fn fetch(&self, source: &ArtifactSource, dest: &Path) -> std::result::Result<u64, DownloadError> {
            assert!(matches!(source, ArtifactSource::Direct { .. }));
            self.fetched.set(self.fetched.get() + 1);
            Ok(tokio::fs::copy(&self.archive, dest).await?)
        }
    }

    fn build_archive(path: &Path, dist_name: &str) {
        let file = std::fs::File::create(path).unwrap();
        let gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(gz);
        let data = b"#!/bin/sh\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/bin/cmake", dist_name), &data[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn setup(sha256: Option<String>) -> (tempfile::TempDir, CmakeConfig, ArchiveFetcher) {
        let dir = tempfile::tempdir().unwrap();
        let config = CmakeConfig {
            install_root: dir.path().join("opt"),
            sha256,
            ..CmakeConfig::default()
        };
        std::fs::create_dir_all(&config.install_root).unwrap();

        let archive = dir.path().join("served.tar.gz");
        build_archive(&archive, &config.dist_name());

        let fetcher = ArchiveFetcher { archive, fetched: std::cell::Cell::new(0) };
        (dir, config, fetcher)
    }

    #[tokio::test]
    async fn test_pin_installs_and_prepends() {
        let (_dir, config, fetcher) = setup(None);
        let pinner = CmakePinner::new(config.clone());
        let mut env = ProcessEnv::with_base_path("/usr/bin");

        let bin = pinner.pin(&fetcher, &LocalFs, &mut env).await.unwrap();

        assert_eq!(bin, config.bin_dir());
        assert!(bin.join("cmake").exists());
        assert_eq!(env.path_additions().first(), Some(&bin));
        // archive cleaned up
        assert!(!pinner.archive_path().exists());
        assert_eq!(fetcher.fetched.get(), 1);
    }

    #[tokio::test]
    async fn test_pin_skips_download_when_present() {
        let (_dir, config, fetcher) = setup(None);
        let pinner = CmakePinner::new(config);
        let mut env = ProcessEnv::with_base_path("/usr/bin");

        pinner.pin(&fetcher, &LocalFs, &mut env).await.unwrap();
        pinner.pin(&fetcher, &LocalFs, &mut env).await.unwrap();

        assert_eq!(fetcher.fetched.get(), 1);
        assert_eq!(env.path_additions().len(), 1);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_rejects_archive() {
        let (_dir, config, fetcher) = setup(Some("00".repeat(32)));
        let pinner = CmakePinner::new(config.clone());
        let mut env = ProcessEnv::with_base_path("/usr/bin");

        let err = pinner.pin(&fetcher, &LocalFs, &mut env).await.unwrap_err();

        assert!(matches!(err, BootstrapError::ChecksumMismatch(_)));
        assert!(!config.bin_dir().exists());
        assert!(env.path_additions().is_empty());
    }

    #[tokio::test]
    async fn test_checksum_match_accepts_archive() {
        let (_dir, mut config, fetcher) = setup(None);
        let digest = crate::downloader::ToolchainDownloader::sha256_file(&fetcher.archive)
            .await
            .unwrap();
        config.sha256 = Some(digest.to_uppercase());
        let pinner = CmakePinner::new(config);
        let mut env = ProcessEnv::with_base_path("/usr/bin");

        assert!(pinner.pin(&fetcher, &LocalFs, &mut env).await.is_ok());
    }
}

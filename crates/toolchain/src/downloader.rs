//! Toolchain Downloader
//!
//! Downloads release archives and the macOS SDK, verifies and extracts them.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use futures::StreamExt;
use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{Client, Response};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use xndk_core::BootstrapError;

use crate::host::{ArtifactFetcher, ArtifactSource};

/// Download configuration
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Connection timeout in seconds
    pub timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self { timeout_secs: 1800 }
    }
}

/// Download error types
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Checksum mismatch for {0}")]
    ChecksumMismatch(String),
    #[error("Extraction failed: {0}")]
    Extraction(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<DownloadError> for BootstrapError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::Network(e) => BootstrapError::Download(e.to_string()),
            DownloadError::Io(e) => BootstrapError::Io(e),
            DownloadError::ChecksumMismatch(what) => BootstrapError::ChecksumMismatch(what),
            DownloadError::Extraction(msg) => BootstrapError::Extraction(msg),
            DownloadError::InvalidResponse(msg) => BootstrapError::Download(msg),
        }
    }
}

/// HTTP downloader
pub struct ToolchainDownloader {
    config: DownloadConfig,
    client: Client,
}

impl ToolchainDownloader {
    /// Create a new downloader
    pub fn new(config: DownloadConfig) -> Result<Self, DownloadError> {
        let client = Self::client_builder(&config).build()?;
        Ok(Self { config, client })
    }

    fn client_builder(config: &DownloadConfig) -> reqwest::ClientBuilder {
        Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("xndk/", env!("CARGO_PKG_VERSION")))
    }

    /// Download a file
    pub async fn download_file(&self, url: &str, target: &Path) -> Result<u64, DownloadError> {
        info!("Downloading {} to {:?}", url, target);

        let response = self.client.get(url).send().await?;
        let response = Self::check_status(response)?;
        Self::write_body(response, target).await
    }

    /// Download from a host that guards large files behind a confirmation page.
    ///
    /// The first request either returns the file or an interstitial carrying
    /// a confirmation token (as a `download_warning` cookie or in the page).
    /// The second request repeats the first with that token. Cookies live in
    /// a jar private to this call and are gone when it returns.
    pub async fn download_confirmed(
        &self,
        endpoint: &str,
        file_id: &str,
        target: &Path,
    ) -> Result<u64, DownloadError> {
        info!("Downloading file {} from {} to {:?}", file_id, endpoint, target);

        let jar = Arc::new(Jar::default());
        let client = Self::client_builder(&self.config)
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        let response = client.get(endpoint).query(&[("id", file_id)]).send().await?;
        let response = Self::check_status(response)?;

        if is_attachment(&response) {
            debug!("No confirmation needed for {}", file_id);
            return Self::write_body(response, target).await;
        }

        let url = response.url().clone();
        let cookies = jar
            .cookies(&url)
            .and_then(|value| value.to_str().ok().map(str::to_string));
        let page = response.text().await?;

        let token = extract_confirm_token(cookies.as_deref(), &page).ok_or_else(|| {
            DownloadError::InvalidResponse(format!("no confirmation token for {}", file_id))
        })?;
        debug!("Confirming download of {} with token {}", file_id, token);

        let response = client
            .get(endpoint)
            .query(&[("confirm", token.as_str()), ("id", file_id)])
            .send()
            .await?;
        let response = Self::check_status(response)?;
        Self::write_body(response, target).await
    }

    fn check_status(response: Response) -> Result<Response, DownloadError> {
        if !response.status().is_success() {
            return Err(DownloadError::InvalidResponse(format!(
                "HTTP {} from {}",
                response.status(),
                response.url()
            )));
        }
        Ok(response)
    }

    /// Stream the body next to `target` and move it into place only once it
    /// arrived whole, so an existing `target` is always a finished download
    async fn write_body(response: Response, target: &Path) -> Result<u64, DownloadError> {
        // Ensure parent directory exists
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(target);
        match Self::stream_to(response, &partial).await {
            Ok(downloaded) => {
                tokio::fs::rename(&partial, target).await?;
                info!("Download complete: {:?} ({} bytes)", target, downloaded);
                Ok(downloaded)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }

    async fn stream_to(response: Response, path: &Path) -> Result<u64, DownloadError> {
        let total_size = response.content_length();
        let mut downloaded: u64 = 0;

        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }

        file.flush().await?;
        check_length(total_size, downloaded)?;
        Ok(downloaded)
    }

    /// Lowercase hex SHA-256 of a file
    pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
        let data = tokio::fs::read(path).await?;
        let mut hasher = Sha256::new();
        hasher.update(&data);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Extract a tar.gz file
    pub async fn extract_tar_gz(archive: &Path, target_dir: &Path) -> Result<(), DownloadError> {
        info!("Extracting {:?} to {:?}", archive, target_dir);

        let archive = archive.to_path_buf();
        let target_dir = target_dir.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<(), DownloadError> {
            std::fs::create_dir_all(&target_dir)?;
            let file = std::fs::File::open(&archive)?;
            let gz = flate2::read::GzDecoder::new(file);
            let mut tar = tar::Archive::new(gz);
            tar.set_preserve_permissions(true);

            tar.unpack(&target_dir)
                .map_err(|e| DownloadError::Extraction(format!("{}: {}", archive.display(), e)))?;

            Ok(())
        })
        .await
        .map_err(|e| DownloadError::Extraction(e.to_string()))?
    }
}

impl ArtifactFetcher for ToolchainDownloader {
    async fn fetch(&self, source: &ArtifactSource, dest: &Path) -> Result<u64, DownloadError> {
        match source {
            ArtifactSource::Direct { url } => self.download_file(url, dest).await,
            ArtifactSource::ConfirmToken { endpoint, file_id } => {
                self.download_confirmed(endpoint, file_id, dest).await
            }
        }
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// A body shorter or longer than its `Content-Length` is a failed download
fn check_length(expected: Option<u64>, received: u64) -> Result<(), DownloadError> {
    match expected {
        Some(expected) if expected != 0 && expected != received => Err(DownloadError::InvalidResponse(
            format!("expected {} bytes, got {}", expected, received),
        )),
        _ => Ok(()),
    }
}

fn is_attachment(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().starts_with("attachment"))
        .unwrap_or(false)
}

/// Find the confirmation token in a `Cookie` header value or an interstitial page
pub fn extract_confirm_token(cookies: Option<&str>, page: &str) -> Option<String> {
    if let Some(cookies) = cookies {
        for pair in cookies.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                if name.starts_with("download_warning") && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    let patterns = [
        r"confirm=([0-9A-Za-z_-]+)",
        r#"name="confirm"\s+value="([0-9A-Za-z_-]+)""#,
    ];
    for pattern in patterns {
        let re = Regex::new(pattern).ok()?;
        if let Some(caps) = re.captures(page) {
            return Some(caps[1].to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const FILE_ID: &str = "1abc";

    fn downloader() -> ToolchainDownloader {
        ToolchainDownloader::new(DownloadConfig::default()).unwrap()
    }

    fn endpoint(server: &Server) -> String {
        format!("{}/uc?export=download", server.url())
    }

    fn query(confirm: Option<&str>) -> Matcher {
        let query = match confirm {
            Some(token) => format!("^export=download&confirm={}&id={}$", token, FILE_ID),
            None => format!("^export=download&id={}$", FILE_ID),
        };
        Matcher::Regex(query)
    }

    #[tokio::test]
    async fn test_confirmed_download_direct_attachment() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/uc")
            .match_query(query(None))
            .with_header("content-disposition", "attachment; filename=\"MacOSX10.15.sdk.tar.xz\"")
            .with_body("sdk-bytes")
            .expect(1)
            .create_async()
            .await;
        let confirm = server
            .mock("GET", "/uc")
            .match_query(Matcher::Regex("confirm=".into()))
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("tarballs").join("sdk.tar.xz");
        let size = downloader()
            .download_confirmed(&endpoint(&server), FILE_ID, &target)
            .await
            .unwrap();

        assert_eq!(size, 9);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "sdk-bytes");
        first.assert_async().await;
        confirm.assert_async().await;
    }

    #[tokio::test]
    async fn test_confirmed_download_token_from_cookie() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/uc")
            .match_query(query(None))
            .with_header("content-type", "text/html")
            .with_header("set-cookie", "download_warning_1abc=Cookie_Tok; Path=/")
            .with_body("<html>Google Drive can't scan this file for viruses.</html>")
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/uc")
            .match_query(query(Some("Cookie_Tok")))
            .with_header("content-disposition", "attachment")
            .with_body("sdk")
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sdk.tar.xz");
        downloader()
            .download_confirmed(&endpoint(&server), FILE_ID, &target)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "sdk");
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_confirmed_download_token_from_page() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/uc")
            .match_query(query(None))
            .with_header("content-type", "text/html")
            .with_body(r#"<a id="uc-download-link" href="/uc?export=download&amp;confirm=t0K-e_n&amp;id=1abc">Download anyway</a>"#)
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/uc")
            .match_query(query(Some("t0K-e_n")))
            .with_body("sdk")
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sdk.tar.xz");
        let size = downloader()
            .download_confirmed(&endpoint(&server), FILE_ID, &target)
            .await
            .unwrap();

        assert_eq!(size, 3);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_confirmed_download_without_token() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/uc")
            .match_query(query(None))
            .with_header("content-type", "text/html")
            .with_body("<html>Too many users have viewed or downloaded this file recently.</html>")
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sdk.tar.xz");
        let result = downloader()
            .download_confirmed(&endpoint(&server), FILE_ID, &target)
            .await;

        assert!(matches!(result, Err(DownloadError::InvalidResponse(_))));
        assert!(!target.exists());
        first.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_leaves_no_file() {
        let mut server = Server::new_async().await;
        server.mock("GET", "/cmake.tar.gz").with_status(404).create_async().await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cmake.tar.gz");
        let result = downloader()
            .download_file(&format!("{}/cmake.tar.gz", server.url()), &target)
            .await;

        assert!(matches!(result, Err(DownloadError::InvalidResponse(_))));
        assert!(!target.exists());
    }

    #[test]
    fn test_short_body_is_rejected() {
        assert!(matches!(check_length(Some(10), 4), Err(DownloadError::InvalidResponse(_))));
        assert!(check_length(Some(4), 4).is_ok());
        // no length announced
        assert!(check_length(None, 4).is_ok());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/opt/tarballs/sdk.tar.xz")),
            PathBuf::from("/opt/tarballs/sdk.tar.xz.part")
        );
    }

    #[test]
    fn test_token_from_cookie() {
        let cookies = "NID=511=abc; download_warning_13058876669334088843_1aBcD=Xy_9";
        assert_eq!(extract_confirm_token(Some(cookies), ""), Some("Xy_9".to_string()));
    }

    #[test]
    fn test_token_from_link() {
        let page = r#"<a id="uc-download-link" href="/uc?export=download&amp;confirm=t0K-e_n&amp;id=1abc">"#;
        assert_eq!(extract_confirm_token(None, page), Some("t0K-e_n".to_string()));
    }

    #[test]
    fn test_token_from_form_field() {
        let page = r#"<form><input type="hidden" name="confirm" value="t"><input name="id" value="1abc"></form>"#;
        assert_eq!(extract_confirm_token(Some("NID=1"), page), Some("t".to_string()));
    }

    #[test]
    fn test_no_token() {
        assert_eq!(extract_confirm_token(Some("NID=1; other=2"), "<html>quota exceeded</html>"), None);
    }

    #[test]
    fn test_error_conversion() {
        let err: BootstrapError = DownloadError::ChecksumMismatch("cmake.tar.gz".into()).into();
        assert!(matches!(err, BootstrapError::ChecksumMismatch(_)));

        let err: BootstrapError = DownloadError::InvalidResponse("HTTP 404".into()).into();
        assert!(matches!(err, BootstrapError::Download(_)));
    }

    #[tokio::test]
    async fn test_sha256_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        tokio::fs::write(&path, b"abc").await.unwrap();

        assert_eq!(
            ToolchainDownloader::sha256_file(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_extract_tar_gz() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("cmake.tar.gz");

        {
            let file = std::fs::File::create(&archive).unwrap();
            let gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(gz);
            let data = b"#!/bin/sh\necho cmake\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, "cmake-3.27.7-linux-x86_64/bin/cmake", &data[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let out = dir.path().join("opt");
        ToolchainDownloader::extract_tar_gz(&archive, &out).await.unwrap();
        assert!(out.join("cmake-3.27.7-linux-x86_64").join("bin").join("cmake").exists());
    }

    #[tokio::test]
    async fn test_extract_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.tar.gz");
        std::fs::write(&archive, b"<html>not an archive</html>").unwrap();

        let result = ToolchainDownloader::extract_tar_gz(&archive, &dir.path().join("out")).await;
        assert!(matches!(result, Err(DownloadError::Extraction(_))));
    }
}

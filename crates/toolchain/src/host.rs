//! Host seams
//!
//! Everything the bootstrap does to the machine goes through one of three
//! collaborators: a command runner, an artifact fetcher and a filesystem.
//! The system implementations live here and in the downloader; tests swap
//! in recording fakes.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};
use walkdir::WalkDir;

use xndk_core::{BootstrapError, Result};

use crate::downloader::{DownloadError, ToolchainDownloader};

/// An external command with its working directory and environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set a variable, replacing an earlier value for the same key
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.env.retain(|(k, _)| *k != key);
        self.env.push((key, value.into()));
        self
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Program and arguments as one line, for logs
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Where a downloadable artifact comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    /// Plain HTTPS GET
    Direct { url: String },
    /// File host that answers large files with a confirmation interstitial
    ConfirmToken { endpoint: String, file_id: String },
}

impl ArtifactSource {
    pub fn direct(url: impl Into<String>) -> Self {
        ArtifactSource::Direct { url: url.into() }
    }
}

/// Runs external programs to completion
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run with inherited stdout/stderr; returns the exit code, `None` if killed by a signal
    async fn run(&self, cmd: &CommandSpec) -> io::Result<Option<i32>>;
}

/// Fetches remote artifacts to local files
#[allow(async_fn_in_trait)]
pub trait ArtifactFetcher {
    /// Download `source` to `dest`, returning the number of bytes written
    async fn fetch(&self, source: &ArtifactSource, dest: &Path) -> std::result::Result<u64, DownloadError>;
}

/// Filesystem operations used while provisioning
#[allow(async_fn_in_trait)]
pub trait Filesystem {
    async fn exists(&self, path: &Path) -> bool;

    /// True if `dir` exists and has at least one entry
    async fn is_populated(&self, dir: &Path) -> bool;

    /// Sorted entry names of a directory
    async fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>>;

    /// Number of entries below `root`, recursively, not counting `root`
    async fn count_entries(&self, root: &Path) -> io::Result<u64>;

    /// Copy a tree, returning the number of entries created
    async fn copy_tree(&self, from: &Path, to: &Path) -> io::Result<u64>;

    async fn remove_tree(&self, path: &Path) -> io::Result<()>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    async fn write_file(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Lowercase hex SHA-256 of a file
    async fn sha256(&self, path: &Path) -> io::Result<String>;

    async fn unpack_tar_gz(&self, archive: &Path, dest: &Path) -> std::result::Result<(), DownloadError>;
}

/// Run a command and turn spawn failures and non-zero exits into errors
pub async fn run_checked<R: CommandRunner>(runner: &R, cmd: &CommandSpec) -> Result<()> {
    debug!("Running: {}", cmd.display());

    let code = runner.run(cmd).await.map_err(|source| BootstrapError::Spawn {
        program: cmd.program.clone(),
        source,
    })?;

    match code {
        Some(0) => Ok(()),
        code => {
            warn!("{} failed with {:?}", cmd.display(), code);
            Err(BootstrapError::CommandFailed {
                program: cmd.program.clone(),
                code,
            })
        }
    }
}

/// Runs commands as child processes of this one
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, cmd: &CommandSpec) -> io::Result<Option<i32>> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .envs(cmd.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        if let Some(ref dir) = cmd.cwd {
            command.current_dir(dir);
        }

        let status = command.status().await?;
        Ok(status.code())
    }
}

/// The local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl Filesystem for LocalFs {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::symlink_metadata(path).await.is_ok()
    }

    async fn is_populated(&self, dir: &Path) -> bool {
        match tokio::fs::read_dir(dir).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
            Err(_) => false,
        }
    }

    async fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }

    async fn count_entries(&self, root: &Path) -> io::Result<u64> {
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || -> io::Result<u64> {
            let mut count = 0u64;
            for entry in WalkDir::new(&root).min_depth(1) {
                entry.map_err(io::Error::from)?;
                count += 1;
            }
            Ok(count)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }

    async fn copy_tree(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let from = from.to_path_buf();
        let to = to.to_path_buf();
        tokio::task::spawn_blocking(move || copy_tree_blocking(&from, &to))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }

    async fn remove_tree(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_dir_all(path).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await
    }

    async fn sha256(&self, path: &Path) -> io::Result<String> {
        ToolchainDownloader::sha256_file(path).await
    }

    async fn unpack_tar_gz(&self, archive: &Path, dest: &Path) -> std::result::Result<(), DownloadError> {
        ToolchainDownloader::extract_tar_gz(archive, dest).await
    }
}

fn copy_tree_blocking(from: &Path, to: &Path) -> io::Result<u64> {
    std::fs::create_dir_all(to)?;

    let mut copied = 0u64;
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let dest = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest)?;
        } else {
            // std::fs::copy keeps the permission bits, build scripts stay executable
            std::fs::copy(entry.path(), &dest)?;
        }
        copied += 1;
    }

    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
    let target = std::fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
    std::fs::copy(src, dest).map(|_| ())
}

//! Host Package Installer
//!
//! Refreshes the package index and installs the fixed list of host
//! packages the cross toolchain and the delegate build need.

use tracing::info;

use xndk_core::config::PackagesConfig;
use xndk_core::Result;

use crate::env::ProcessEnv;
use crate::host::{run_checked, CommandRunner, CommandSpec};

/// Installs host packages through the system package manager
pub struct PackageInstaller {
    config: PackagesConfig,
}

impl PackageInstaller {
    pub fn new(config: PackagesConfig) -> Self {
        Self { config }
    }

    fn base_command(&self, env: &ProcessEnv) -> CommandSpec {
        env.command(&self.config.manager)
            .env("DEBIAN_FRONTEND", "noninteractive")
    }

    /// Index refresh command
    pub fn update_command(&self, env: &ProcessEnv) -> CommandSpec {
        self.base_command(env).arg("update")
    }

    /// Package install command
    pub fn install_command(&self, env: &ProcessEnv) -> CommandSpec {
        self.base_command(env)
            .args(["install", "-y"])
            .args(self.config.packages.iter().map(String::as_str))
    }

    /// Refresh the index, then install every configured package
    pub async fn install<R: CommandRunner>(&self, runner: &R, env: &ProcessEnv) -> Result<()> {
        info!("Updating package index with {}", self.config.manager);
        run_checked(runner, &self.update_command(env)).await?;

        if self.config.packages.is_empty() {
            info!("No host packages configured");
            return Ok(());
        }

        info!("Installing {} host packages", self.config.packages.len());
        run_checked(runner, &self.install_command(env)).await?;

        info!("Host packages installed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::ffi::OsString;
    use xndk_core::BootstrapError;

    #[derive(Default)]
    struct ScriptedRunner {
        codes: RefCell<Vec<Option<i32>>>,
        calls: RefCell<Vec<CommandSpec>>,
    }

    impl CommandRunner for ScriptedRunner {
        async fn run(&self, cmd: &CommandSpec) -> std::io::Result<Option<i32>> {
            self.calls.borrow_mut().push(cmd.clone());
            let mut codes = self.codes.borrow_mut();
            Ok(if codes.is_empty() { Some(0) } else { codes.remove(0) })
        }
    }

    fn installer(packages: &[&str]) -> PackageInstaller {
        PackageInstaller::new(PackagesConfig {
            manager: "apt-get".into(),
            packages: packages.iter().map(|p| p.to_string()).collect(),
        })
    }

    #[test]
    fn test_install_command() {
        let env = ProcessEnv::with_base_path("/usr/bin");
        let cmd = installer(&["clang", "libxml2-dev"]).install_command(&env);

        assert_eq!(cmd.program, "apt-get");
        assert_eq!(
            cmd.args,
            ["install", "-y", "clang", "libxml2-dev"].map(OsString::from).to_vec()
        );
        assert_eq!(cmd.env_var("DEBIAN_FRONTEND"), Some("noninteractive"));
        assert_eq!(cmd.env_var("PATH"), Some("/usr/bin"));
    }

    #[tokio::test]
    async fn test_update_then_install() {
        let runner = ScriptedRunner::default();
        let env = ProcessEnv::with_base_path("/usr/bin");

        installer(&["clang"]).install(&runner, &env).await.unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].display(), "apt-get update");
        assert_eq!(calls[1].display(), "apt-get install -y clang");
    }

    #[tokio::test]
    async fn test_update_failure_stops_install() {
        let runner = ScriptedRunner::default();
        runner.codes.borrow_mut().push(Some(100));
        let env = ProcessEnv::with_base_path("/usr/bin");

        let err = installer(&["clang"]).install(&runner, &env).await.unwrap_err();

        assert!(matches!(err, BootstrapError::CommandFailed { code: Some(100), .. }));
        assert_eq!(runner.calls.borrow().len(), 1);
    }
}

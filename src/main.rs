//! xndk - macOS cross toolchain bootstrap
//!
//! Entry point: sets up logging, provisions the host, runs the delegate
//! build and exits with the first failure's status.

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use xndk::commands::BootstrapCommand;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Main entry point
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("{} v{} starting...", xndk::core::APP_NAME, VERSION);

    let result = match BootstrapCommand::from_env().await {
        Ok(command) => command.execute().await.map(|_| ()),
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("{}", e.user_message());
        std::process::exit(e.exit_code());
    }

    Ok(())
}

//! chunksync entry point.

mod app;
mod config;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "CHUNKSYNC_CONFIG";

/// Configuration file used when neither an argument nor the env var is set.
const DEFAULT_CONFIG: &str = "chunksync.toml";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting chunksync");

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    let config = config::Config::load(&path)?;
    tracing::info!(
        config = %path.display(),
        source = %config.source.display(),
        endpoint = %config.endpoint,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("sync finished");
    Ok(())
}

//! Runs a single EtherLink node in the foreground until interrupted.

mod app;
mod config;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = config::NodeConfig::load()?;
    tracing::info!(
        name = %config.name,
        version = env!("CARGO_PKG_VERSION"),
        "etherlink node starting"
    );

    app::run(config).await
}

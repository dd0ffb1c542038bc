//! worldcast - shared world state server binary

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("worldcast v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = server::Config::load()?;
    info!("Loaded configuration");
    info!("  Host: {}", config.server.host);
    info!("  Port: {}", config.server.port);
    info!("  Tick rate: {}", config.server.tick_rate);

    server::run(config).await?;

    Ok(())
}

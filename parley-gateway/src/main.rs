//! Parley Gateway - Main entry point.

use anyhow::Result;
use parley_common::config::Config;
use parley_common::logging::init_logging_with_exclusions;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let config = Config::load_and_validate()?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Parley Gateway v{}", env!("CARGO_PKG_VERSION"));

    parley_gateway::start_server(&config).await
}

use std::process::ExitCode;

use graceline::config::Config;
use graceline::error::StartupError;
use graceline::health;
use graceline::lifecycle::Lifecycle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "graceline=info".into()),
        )
        .init();

    // Load configuration from CLI args, environment variables, and config file
    let config = match Config::load().map_err(StartupError::from) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    tracing::info!("Starting graceline");
    tracing::info!("  Listening on: {}", config.bind_addr());
    tracing::info!("  Grace period: {:?}", config.grace_period);

    let lifecycle = match Lifecycle::start(&config, health::router()).await {
        Ok(lifecycle) => lifecycle,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    let report = lifecycle.run().await;

    tracing::info!("Server stopped ({})", report.trigger);
    ExitCode::from(&report)
}

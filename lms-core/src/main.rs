use anyhow::Result;
use lms_core::{config::Config, server, telemetry};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let metrics_handle = telemetry::init(&config.telemetry)?;

    info!("Starting LMS Core Service");
    info!("HTTP server listening on {}", config.http_addr());

    server::run(config, metrics_handle).await
}

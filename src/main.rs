use anyhow::Result;
use axum::Router;
use caretimes_pipeline::config::{LogFormat, Settings};
use caretimes_pipeline::Application;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match settings.logging.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
    }

    info!(
        environment = %settings.application.environment,
        "Starting caretimes pipeline application"
    );

    let app = Application::build(settings, Router::new()).await?;
    app.run().await?;

    Ok(())
}

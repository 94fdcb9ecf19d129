mod config;
mod constants;
mod routes;
mod services;
#[cfg(test)]
mod test_support;

use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

use config::Config;
use services::fetcher::ImageFetcher;
use services::vision::{GoogleVisionClient, VisionClient};

pub struct AppState {
    pub fetcher: ImageFetcher,
    pub vision: Arc<dyn VisionClient>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Credentials are passed explicitly to the Vision client
    let config = Config::from_env()?;

    let fetcher = ImageFetcher::new(config.fetch_timeout, config.max_upload_bytes)?;
    let vision = GoogleVisionClient::from_config(&config).await?;

    let state = Arc::new(AppState {
        fetcher,
        vision: Arc::new(vision),
    });

    let app = routes::app(state, config.max_upload_bytes);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        vision_endpoint = %config.vision_endpoint,
        fetch_timeout_secs = config.fetch_timeout.as_secs(),
        vision_timeout_secs = config.vision_timeout.as_secs(),
        "Listening on http://{}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsflow::config::{Config, API_KEY_ENV};
use newsflow::fetcher::Fetcher;
use newsflow::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsflow=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("NEWSFLOW_CONFIG").unwrap_or_else(|_| "newsflow.toml".to_string());
    let config = Config::load_or_default(&config_path)?.with_env();
    info!("Using upstream {}", config.base_url);
    if config.api_key().is_none() {
        warn!(
            "{} is not set; news requests will fail until it is configured",
            API_KEY_ENV
        );
    }

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState {
        fetcher: Fetcher::new(config)?,
    });

    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

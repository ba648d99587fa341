//! Fintrack Statement Processing Service
//!
//! Bank statement upload and transaction extraction.

use anyhow::Result;
use fintrack_statement_processing::{
    create_router, AppState, ChatCompletion, ExtractionMetrics, OpenAiClient, PdfProcessor,
    StatementExtractor, UploadStore,
};
use fintrack_utils::{init_logging, AppConfig, RateLimiter};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load().unwrap_or_else(|_| {
        eprintln!("Failed to load configuration, using defaults");
        AppConfig::default()
    });
    config.validate_all()?;

    init_logging(&config.logging)?;
    info!("Starting Fintrack Statement Processing Service");

    let uploads = Arc::new(UploadStore::from_config(&config.uploads));
    uploads.ensure_dir().await?;
    uploads.sweep_stale().await;
    uploads.clone().spawn_periodic_sweep();

    let llm: Option<Arc<dyn ChatCompletion>> = match config.llm.credential() {
        Some(_) => Some(Arc::new(OpenAiClient::new(&config.llm)?)),
        None => {
            warn!("No LLM API key configured, statements will use pattern extraction only");
            None
        }
    };

    let limiter = Arc::new(RateLimiter::new());
    let metrics = ExtractionMetrics::new();
    let extractor = StatementExtractor::from_config(
        &config,
        Arc::new(PdfProcessor::new()),
        llm,
        limiter.clone(),
        uploads.clone(),
        metrics.clone(),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = create_router(AppState {
        extractor,
        uploads,
        limiter,
        metrics,
        config: Arc::new(config),
    });

    let listener = TcpListener::bind(&addr).await?;
    info!("Statement Processing Service listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

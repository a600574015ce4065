mod config;
mod error;
mod handlers;
mod models;
mod server;
mod services;

use anyhow::Result;
use dotenv::dotenv;
use std::sync::Arc;

use config::AppConfig;
use handlers::{AnalysisHandler, LogHandler, StatsHandler};
use services::{Database, RecognitionService};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables first so RUST_LOG from .env applies
    dotenv().ok();
    env_logger::init();

    log::info!("🚀 Starting Nutrition Tracker...");

    let config = AppConfig::from_env()?;

    let db = Arc::new(Database::new(&config.database_url).await?);
    log::info!("✅ PostgreSQL database initialized");

    let recognition = Arc::new(RecognitionService::from_config(&config.recognition));
    let providers = recognition.provider_names();
    if providers.is_empty() {
        log::warn!("⚠️ No vision provider credentials configured, image analysis will be simulated");
    } else {
        log::info!("✅ Recognition providers (in priority order): {}", providers.join(" -> "));
    }

    let analysis_handler = Arc::new(AnalysisHandler::new(db.clone(), recognition.clone()));
    let log_handler = Arc::new(LogHandler::new(db.clone()));
    let stats_handler = Arc::new(StatsHandler::new(db.clone()));

    let state = server::AppState {
        analysis: analysis_handler,
        logs: log_handler,
        stats: stats_handler,
    };
    let app = server::create_router(state, config.recognition.max_image_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    log::info!("🌐 HTTP server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {}", e);
            }
            log::info!("🛑 Shutting down...");
        })
        .await?;

    Ok(())
}

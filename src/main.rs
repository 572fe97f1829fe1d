// src/main.rs
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use tx_submission_engine::api::{
    add_transaction_handler, get_transaction_handler, health_check, retry_handler,
    sync_nonce_handler, tick_handler, AppState,
};
use tx_submission_engine::config::Settings;
use tx_submission_engine::engine::Engine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let settings = Settings::load()?;
    log::info!(
        "loaded config: node_url={}, accounts={}, max_retries={}",
        settings.node_url,
        settings.accounts.len(),
        settings.max_retries
    );

    let engine = Arc::new(Engine::from_settings(&settings)?);

    match engine.initialize(&settings.node_url).await {
        Ok(()) => log::info!("gateway initialized"),
        Err(e) => log::error!("gateway initialization failed, driver will idle: {e}"),
    }

    spawn_background_loops(Arc::clone(&engine), settings.tick_interval_ms);

    let state = AppState { engine };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/transactions", post(add_transaction_handler))
        .route("/transactions/{id}", get(get_transaction_handler))
        .route("/tick", post(tick_handler))
        .route("/retry", post(retry_handler))
        .route("/accounts/{address}/sync-nonce", post(sync_nonce_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3001").await?;
    log::info!("tx submission engine listening on http://127.0.0.1:3001");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Drives the submission loop and periodic reconciliation. The core
/// itself is single-threaded cooperative logic; these are just the
/// timers that invoke `tick`/`retry_failed` on a schedule.
fn spawn_background_loops(engine: Arc<Engine>, tick_interval_ms: u64) {
    let tick_engine = Arc::clone(&engine);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_interval_ms));
        loop {
            interval.tick().await;
            tick_engine.tick().await;
        }
    });

    let reconcile_engine = Arc::clone(&engine);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            reconcile_engine.retry_failed().await;
            reconcile_engine.detect_nonce_gaps().await;
        }
    });
}

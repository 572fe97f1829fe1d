//! HTTP front-end over the engine's public API (§6). Mirrors the
//! teacher's `handlers.rs`: validate the request, call into the engine,
//! log at each step, map errors onto `StatusCode`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::model::Status;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub async fn health_check() -> Json<HashMap<String, String>> {
    let mut response = HashMap::new();
    response.insert("status".to_string(), "healthy".to_string());
    response.insert("service".to_string(), "tx-submission-engine".to_string());
    Json(response)
}

#[derive(Debug, Deserialize)]
pub struct AddTransactionRequest {
    pub module: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct AddTransactionResponse {
    pub id: String,
}

pub async fn add_transaction_handler(
    State(state): State<AppState>,
    Json(payload): Json<AddTransactionRequest>,
) -> Result<Json<AddTransactionResponse>, StatusCode> {
    log::info!(
        "enqueue request: {}.{}({} params)",
        payload.module,
        payload.method,
        payload.params.len()
    );

    match state
        .engine
        .add_transaction(payload.module, payload.method, payload.params)
        .await
    {
        Ok(id) => Ok(Json(AddTransactionResponse { id })),
        Err(e) => {
            log::error!("add_transaction failed: {e}");
            Err(e.status_code())
        }
    }
}

pub async fn tick_handler(State(state): State<AppState>) -> StatusCode {
    state.engine.tick().await;
    StatusCode::NO_CONTENT
}

pub async fn retry_handler(State(state): State<AppState>) -> StatusCode {
    state.engine.retry_failed().await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct SyncNonceRequest {
    pub on_chain_nonce: u64,
}

pub async fn sync_nonce_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(payload): Json<SyncNonceRequest>,
) -> StatusCode {
    state
        .engine
        .sync_account_nonce(&address, payload.on_chain_nonce)
        .await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub id: String,
    pub submitter_address: String,
    pub status: Status,
    pub assigned_nonce: u64,
    pub retry_count: u32,
}

pub async fn get_transaction_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TransactionView>, StatusCode> {
    let snapshot = state.engine.snapshot().await;
    let tx = snapshot
        .queues
        .processing
        .get(&id)
        .cloned()
        .or_else(|| snapshot.queues.pending.iter().find(|t| t.id == id).cloned());

    match tx {
        Some(tx) => Ok(Json(TransactionView {
            id: tx.id,
            submitter_address: tx.submitter_address,
            status: tx.status,
            assigned_nonce: tx.assigned_nonce,
            retry_count: tx.retry_count,
        })),
        None => Err(StatusCode::NOT_FOUND),
    }
}

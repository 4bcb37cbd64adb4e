use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::cache::CacheStatus;
use crate::state::AppState;
use crate::worker::StatsSnapshot;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub worker: String,
    pub uptime: u64,
    pub queue_length: usize,
    pub active_batches: usize,
    pub timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub worker: String,
    pub uptime: u64,
    pub resident_memory_bytes: Option<u64>,
    pub queue_length: usize,
    pub pending_keys: usize,
    pub counters: StatsSnapshot,
    pub cache: CacheStatus,
    pub timestamp: String,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let worker = &state.worker;
    Json(HealthResponse {
        status: "healthy",
        worker: worker.id().to_string(),
        uptime: worker.uptime().as_secs(),
        queue_length: worker.queue_len(),
        active_batches: worker.active_batches(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let worker = &state.worker;
    Json(StatsResponse {
        worker: worker.id().to_string(),
        uptime: worker.uptime().as_secs(),
        resident_memory_bytes: state.resident_memory(),
        queue_length: worker.queue_len(),
        pending_keys: worker.pending_keys(),
        counters: worker.stats(),
        cache: worker.cache().status().await,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

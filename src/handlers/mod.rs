mod analyze;
mod health;
mod metrics;

pub use analyze::{analyze_batch_handler, analyze_handler};
pub use health::{health_handler, stats_handler};
pub use metrics::metrics_handler;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/analyze", post(analyze_handler))
        .route("/analyze-batch", post(analyze_batch_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

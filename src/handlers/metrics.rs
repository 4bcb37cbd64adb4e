use axum::{http::StatusCode, response::IntoResponse};
use tracing::error;

pub async fn metrics_handler() -> impl IntoResponse {
    match crate::metrics::render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

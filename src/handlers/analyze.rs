use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::error::AnalysisError;
use crate::models::{AnalysisResult, Priority, ProductSignature};
use crate::state::AppState;
use crate::worker::check_batch_len;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub product_data: ProductSignature,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub success: bool,
    pub analysis: AnalysisResult,
    pub cached: bool,
    pub processing_time_ms: u64,
    pub worker: String,
}

// Items stay untyped until the count is checked, so an oversized batch is
// reported as such even when one of its items is malformed.
#[derive(Deserialize)]
pub struct BatchRequest {
    pub products: Vec<serde_json::Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub product_data: ProductSignature,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub success: bool,
    pub results: Vec<BatchItem>,
    pub total_processing_time_ms: u64,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
}

pub struct ApiError(AnalysisError);

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(AnalysisError::InvalidRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.0.kind(),
            message: self.0.to_string(),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let start_time = Instant::now();
    let Json(payload) = payload?;
    let submission = state
        .worker
        .submit(&payload.product_data, payload.priority)
        .await?;

    info!(
        worker = %state.worker.id(),
        cached = submission.cached,
        provenance = ?submission.result.provenance,
        "analysis served"
    );
    Ok(Json(AnalyzeResponse {
        success: true,
        analysis: submission.result,
        cached: submission.cached,
        processing_time_ms: start_time.elapsed().as_millis() as u64,
        worker: state.worker.id().to_string(),
    }))
}

pub async fn analyze_batch_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let start_time = Instant::now();
    let Json(payload) = payload?;
    check_batch_len(payload.products.len())?;
    let products = payload
        .products
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            serde_json::from_value::<ProductSignature>(value).map_err(|e| {
                AnalysisError::InvalidRequest(format!("products[{i}] is malformed: {e}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let outcomes = state.worker.submit_batch(products).await?;

    let results = outcomes
        .into_iter()
        .map(|item| match item.outcome {
            Ok(submission) => BatchItem {
                success: true,
                analysis: Some(submission.result),
                error: None,
                product_data: item.product,
            },
            Err(e) => BatchItem {
                success: false,
                analysis: None,
                error: Some(e.to_string()),
                product_data: item.product,
            },
        })
        .collect();

    Ok(Json(BatchResponse {
        success: true,
        results,
        total_processing_time_ms: start_time.elapsed().as_millis() as u64,
    }))
}

// HTTP route handlers for the Quest API

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use quest_common::types::SubmittedCode;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub source_code: String,
    #[serde(alias = "quest_id")]
    pub exercise_id: String,
}

/// POST /api/code/execute - Run and grade one submission
pub async fn execute_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteRequest>,
) -> Response {
    if payload.exercise_id.trim().is_empty() {
        warn!("Rejected submission without exercise id");
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "exercise_id must not be empty"
            })),
        )
            .into_response();
    }

    info!(
        exercise_id = %payload.exercise_id,
        source_bytes = payload.source_code.len(),
        "Submission received"
    );

    let code = SubmittedCode::new(payload.source_code, payload.exercise_id);
    let report = state.engine.run(&code).await;

    (StatusCode::OK, Json(report)).into_response()
}

/// GET /api/health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy"
        })),
    )
}

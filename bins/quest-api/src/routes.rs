use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/code/execute", post(handlers::execute_code))
        .route("/api/health", get(handlers::health_check))
}

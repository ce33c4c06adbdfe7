use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use crate::auth::AppState;

/// POST /notifications/run — manual scan trigger.
///
/// Runs exactly one scan synchronously and reports the outcome without
/// touching the recurring cadence. Useful when an external cron drives the
/// schedule instead of the built-in scheduler.
pub async fn run_scan(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let outcome = state.engine.run_scan_once().await.map_err(|e| {
        error!("Manual reminder scan failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(outcome))
}

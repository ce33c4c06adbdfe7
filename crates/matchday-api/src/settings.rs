use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use matchday_types::api::{Claims, SettingsResponse, UpdateSettingsRequest};

use crate::auth::AppState;

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let inner = state.clone();
    let user = tokio::task::spawn_blocking(move || {
        inner
            .db
            .get_user_by_id(&claims.sub.to_string())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(SettingsResponse {
        push_enabled: user.push_enabled,
        push_token: user.push_token,
        email_enabled: user.email_enabled,
    }))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let inner = state.clone();
    let updated = tokio::task::spawn_blocking(move || {
        inner
            .db
            .update_settings(
                &claims.sub.to_string(),
                req.push_enabled,
                req.push_token.as_deref(),
                req.email_enabled,
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

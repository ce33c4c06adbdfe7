use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use matchday_db::models::MatchRow;
use matchday_types::api::{Claims, CreateMatchRequest, MatchResponse, UpdateMatchRequest};

use crate::auth::AppState;
use crate::{parse_row_ts, parse_row_uuid};

fn to_response(row: MatchRow) -> MatchResponse {
    MatchResponse {
        id: parse_row_uuid(&row.id, "match id"),
        team_id: parse_row_uuid(&row.team_id, "match team_id"),
        opponent: row.opponent,
        date: parse_row_ts(&row.date, "match date"),
        venue: row.venue,
        match_type: row.match_type,
        is_finished: row.is_finished,
        notification_sent: row.notification_sent,
        notification_sent_at: row
            .notification_sent_at
            .as_deref()
            .map(|ts| parse_row_ts(ts, "match notification_sent_at")),
        created_at: parse_row_ts(&row.created_at, "match created_at"),
    }
}

pub async fn list_matches(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let inner = state.clone();
    let rows = tokio::task::spawn_blocking(move || {
        inner
            .db
            .list_matches(&claims.sub.to_string())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    let matches: Vec<MatchResponse> = rows.into_iter().map(to_response).collect();
    Ok(Json(matches))
}

pub async fn create_match(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateMatchRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.opponent.is_empty() || req.opponent.len() > 128 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let match_id = Uuid::new_v4();

    let inner = state.clone();
    let response = tokio::task::spawn_blocking(move || {
        inner
            .db
            .create_match(
                &match_id.to_string(),
                &claims.sub.to_string(),
                &req.team_id.to_string(),
                &req.opponent,
                req.date,
                req.venue.as_deref(),
                req.match_type.as_deref(),
            )
            // Covers both the unowned-team check and FK violations.
            .map_err(|_| StatusCode::BAD_REQUEST)?;

        Ok::<_, StatusCode>(MatchResponse {
            id: match_id,
            team_id: req.team_id,
            opponent: req.opponent,
            date: req.date,
            venue: req.venue,
            match_type: req.match_type,
            is_finished: false,
            notification_sent: false,
            notification_sent_at: None,
            created_at: chrono::Utc::now(),
        })
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let inner = state.clone();
    let row = tokio::task::spawn_blocking(move || {
        inner
            .db
            .get_match(&claims.sub.to_string(), &match_id.to_string())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(to_response(row)))
}

pub async fn update_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateMatchRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let inner = state.clone();
    let updated = tokio::task::spawn_blocking(move || {
        inner
            .db
            .update_match(
                &claims.sub.to_string(),
                &match_id.to_string(),
                req.opponent.as_deref(),
                req.date,
                req.venue.as_deref(),
                req.match_type.as_deref(),
                req.is_finished,
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

pub async fn delete_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let inner = state.clone();
    let deleted = tokio::task::spawn_blocking(move || {
        inner
            .db
            .delete_match(&claims.sub.to_string(), &match_id.to_string())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use matchday_db::models::TeamRow;
use matchday_types::api::{Claims, CreateTeamRequest, TeamResponse};

use crate::auth::AppState;
use crate::{parse_row_ts, parse_row_uuid};

fn to_response(row: TeamRow, name: String) -> TeamResponse {
    TeamResponse {
        id: parse_row_uuid(&row.id, "team id"),
        name,
        created_at: parse_row_ts(&row.created_at, "team created_at"),
    }
}

pub async fn list_teams(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let inner = state.clone();
    let teams = tokio::task::spawn_blocking(move || {
        let rows = inner
            .db
            .list_teams(&claims.sub.to_string())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        rows.into_iter()
            .map(|row| {
                let name = inner
                    .cipher
                    .decrypt(&row.encrypted_name)
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
                Ok(to_response(row, name))
            })
            .collect::<Result<Vec<_>, StatusCode>>()
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(Json(teams))
}

pub async fn create_team(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateTeamRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.name.is_empty() || req.name.len() > 128 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let team_id = Uuid::new_v4();
    let name = req.name.clone();

    let inner = state.clone();
    tokio::task::spawn_blocking(move || {
        let encrypted_name = inner
            .cipher
            .encrypt(&req.name)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        inner
            .db
            .create_team(&team_id.to_string(), &claims.sub.to_string(), &encrypted_name)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok((
        StatusCode::CREATED,
        Json(TeamResponse {
            id: team_id,
            name,
            created_at: chrono::Utc::now(),
        }),
    ))
}

pub async fn get_team(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let inner = state.clone();
    let team = tokio::task::spawn_blocking(move || {
        let row = inner
            .db
            .get_team(&claims.sub.to_string(), &team_id.to_string())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;
        let name = inner
            .cipher
            .decrypt(&row.encrypted_name)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        Ok::<_, StatusCode>(to_response(row, name))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(Json(team))
}

pub async fn update_team(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateTeamRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.name.is_empty() || req.name.len() > 128 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let inner = state.clone();
    let updated = tokio::task::spawn_blocking(move || {
        let encrypted_name = inner
            .cipher
            .encrypt(&req.name)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        inner
            .db
            .update_team(&claims.sub.to_string(), &team_id.to_string(), &encrypted_name)
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

pub async fn delete_team(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let inner = state.clone();
    let deleted = tokio::task::spawn_blocking(move || {
        inner
            .db
            .delete_team(&claims.sub.to_string(), &team_id.to_string())
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

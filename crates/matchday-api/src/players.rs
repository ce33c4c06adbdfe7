use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use matchday_db::models::PlayerRow;
use matchday_types::api::{Claims, CreatePlayerRequest, PlayerResponse, UpdatePlayerRequest};

use crate::auth::AppState;
use crate::{parse_row_ts, parse_row_uuid};

fn to_response(row: PlayerRow, name: String) -> PlayerResponse {
    PlayerResponse {
        id: parse_row_uuid(&row.id, "player id"),
        team_id: parse_row_uuid(&row.team_id, "player team_id"),
        name,
        position: row.position,
        shirt_number: row.shirt_number,
        created_at: parse_row_ts(&row.created_at, "player created_at"),
    }
}

pub async fn list_players(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let inner = state.clone();
    let players = tokio::task::spawn_blocking(move || {
        let rows = inner
            .db
            .list_players(&claims.sub.to_string(), &team_id.to_string())
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

    Ok(Json(players))
}

pub async fn create_player(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePlayerRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.name.is_empty() || req.name.len() > 128 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let player_id = Uuid::new_v4();
    let name = req.name.clone();
    let position = req.position.clone();
    let shirt_number = req.shirt_number;

    let inner = state.clone();
    tokio::task::spawn_blocking(move || {
        // The team must exist and belong to the caller.
        inner
            .db
            .get_team(&claims.sub.to_string(), &team_id.to_string())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;

        let encrypted_name = inner
            .cipher
            .encrypt(&req.name)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        inner
            .db
            .create_player(
                &player_id.to_string(),
                &team_id.to_string(),
                &claims.sub.to_string(),
                &encrypted_name,
                req.position.as_deref(),
                req.shirt_number,
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok((
        StatusCode::CREATED,
        Json(PlayerResponse {
            id: player_id,
            team_id,
            name,
            position,
            shirt_number,
            created_at: chrono::Utc::now(),
        }),
    ))
}

pub async fn update_player(
    State(state): State<AppState>,
    Path(player_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePlayerRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let inner = state.clone();
    let updated = tokio::task::spawn_blocking(move || {
        let encrypted_name = match req.name.as_deref() {
            Some(name) if !name.is_empty() => Some(
                inner
                    .cipher
                    .encrypt(name)
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
            ),
            _ => None,
        };
        inner
            .db
            .update_player(
                &claims.sub.to_string(),
                &player_id.to_string(),
                encrypted_name.as_deref(),
                req.position.as_deref(),
                req.shirt_number,
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

pub async fn delete_player(
    State(state): State<AppState>,
    Path(player_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let inner = state.clone();
    let deleted = tokio::task::spawn_blocking(move || {
        inner
            .db
            .delete_player(&claims.sub.to_string(), &player_id.to_string())
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

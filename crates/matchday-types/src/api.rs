use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims shared between the REST middleware and the auth handlers.
/// Canonical definition lives here in matchday-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    /// Stored encrypted at rest; only decrypted when a reminder email goes out.
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Teams --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTeamRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// -- Players --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePlayerRequest {
    pub name: String,
    pub position: Option<String>,
    pub shirt_number: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePlayerRequest {
    pub name: Option<String>,
    pub position: Option<String>,
    pub shirt_number: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct PlayerResponse {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub position: Option<String>,
    pub shirt_number: Option<u8>,
    pub created_at: DateTime<Utc>,
}

// -- Matches --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMatchRequest {
    pub team_id: Uuid,
    pub opponent: String,
    pub date: DateTime<Utc>,
    pub venue: Option<String>,
    pub match_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMatchRequest {
    pub opponent: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub venue: Option<String>,
    pub match_type: Option<String>,
    pub is_finished: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub id: Uuid,
    pub team_id: Uuid,
    pub opponent: String,
    pub date: DateTime<Utc>,
    pub venue: Option<String>,
    pub match_type: Option<String>,
    pub is_finished: bool,
    pub notification_sent: bool,
    pub notification_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// -- Notification settings --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSettingsRequest {
    pub push_enabled: Option<bool>,
    pub push_token: Option<String>,
    pub email_enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub push_enabled: bool,
    pub push_token: Option<String>,
    pub email_enabled: bool,
}

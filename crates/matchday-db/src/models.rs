//! Database row types — these map directly to SQLite rows.
//! Distinct from matchday-types API models to keep the DB layer independent.
//! `encrypted_*` columns hold the field cipher's base64 encoding, never
//! plaintext.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub encrypted_email: Option<String>,
    pub encrypted_name: Option<String>,
    pub push_enabled: bool,
    pub push_token: Option<String>,
    pub email_enabled: bool,
    pub created_at: String,
}

pub struct TeamRow {
    pub id: String,
    pub user_id: String,
    pub encrypted_name: String,
    pub created_at: String,
}

pub struct PlayerRow {
    pub id: String,
    pub team_id: String,
    pub user_id: String,
    pub encrypted_name: String,
    pub position: Option<String>,
    pub shirt_number: Option<u8>,
    pub created_at: String,
}

pub struct MatchRow {
    pub id: String,
    pub user_id: String,
    pub team_id: String,
    pub opponent: String,
    pub date: String,
    pub venue: Option<String>,
    pub match_type: Option<String>,
    pub is_finished: bool,
    pub notification_sent: bool,
    pub notification_sent_at: Option<String>,
    pub created_at: String,
}

/// A due-scan candidate: the match projection joined with the owner's
/// notification preferences, fetched in one query.
pub struct DueMatchRow {
    pub id: String,
    pub user_id: String,
    pub opponent: String,
    pub date: String,
    pub venue: Option<String>,
    pub match_type: Option<String>,
    pub push_enabled: bool,
    pub push_token: Option<String>,
    pub email_enabled: bool,
    pub encrypted_email: Option<String>,
    pub encrypted_name: Option<String>,
}

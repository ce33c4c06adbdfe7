use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                password        TEXT NOT NULL,
                encrypted_email TEXT,
                encrypted_name  TEXT,
                push_enabled    INTEGER NOT NULL DEFAULT 0,
                push_token      TEXT,
                email_enabled   INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE teams (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id),
                encrypted_name  TEXT NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_teams_user ON teams(user_id);

            CREATE TABLE players (
                id              TEXT PRIMARY KEY,
                team_id         TEXT NOT NULL REFERENCES teams(id),
                user_id         TEXT NOT NULL REFERENCES users(id),
                encrypted_name  TEXT NOT NULL,
                position        TEXT,
                shirt_number    INTEGER,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_players_team ON players(team_id);

            CREATE TABLE matches (
                id                   TEXT PRIMARY KEY,
                user_id              TEXT NOT NULL REFERENCES users(id),
                team_id              TEXT NOT NULL REFERENCES teams(id),
                opponent             TEXT NOT NULL,
                date                 TEXT NOT NULL,
                venue                TEXT,
                match_type           TEXT,
                is_finished          INTEGER NOT NULL DEFAULT 0,
                notification_sent    INTEGER NOT NULL DEFAULT 0,
                notification_sent_at TEXT,
                created_at           TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_matches_user ON matches(user_id, date);

            -- Covers the reminder scan's candidate query.
            CREATE INDEX idx_matches_due
                ON matches(date) WHERE is_finished = 0 AND notification_sent = 0;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}

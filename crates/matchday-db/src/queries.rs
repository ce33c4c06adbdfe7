use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::models::{DueMatchRow, MatchRow, PlayerRow, TeamRow, UserRow};
use crate::{Database, fmt_ts};

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        encrypted_email: Option<&str>,
        encrypted_name: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, encrypted_email, encrypted_name)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, username, password_hash, encrypted_email, encrypted_name],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(conn, "SELECT id, username, password, encrypted_email, encrypted_name,
                              push_enabled, push_token, email_enabled, created_at
                              FROM users WHERE username = ?1", username)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(conn, "SELECT id, username, password, encrypted_email, encrypted_name,
                              push_enabled, push_token, email_enabled, created_at
                              FROM users WHERE id = ?1", id)
        })
    }

    /// Update notification preferences. `None` leaves a field as-is so the
    /// settings endpoint can send partial updates.
    pub fn update_settings(
        &self,
        user_id: &str,
        push_enabled: Option<bool>,
        push_token: Option<&str>,
        email_enabled: Option<bool>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                     push_enabled  = COALESCE(?2, push_enabled),
                     push_token    = COALESCE(?3, push_token),
                     email_enabled = COALESCE(?4, email_enabled)
                 WHERE id = ?1",
                rusqlite::params![user_id, push_enabled, push_token, email_enabled],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Teams --

    pub fn create_team(&self, id: &str, user_id: &str, encrypted_name: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO teams (id, user_id, encrypted_name) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, user_id, encrypted_name],
            )?;
            Ok(())
        })
    }

    pub fn list_teams(&self, user_id: &str) -> Result<Vec<TeamRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, encrypted_name, created_at
                 FROM teams WHERE user_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([user_id], map_team)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_team(&self, user_id: &str, id: &str) -> Result<Option<TeamRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, encrypted_name, created_at
                 FROM teams WHERE id = ?1 AND user_id = ?2",
                [id, user_id],
                map_team,
            )
            .optional()
        })
    }

    pub fn update_team(&self, user_id: &str, id: &str, encrypted_name: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE teams SET encrypted_name = ?3 WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id, user_id, encrypted_name],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_team(&self, user_id: &str, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "DELETE FROM matches WHERE team_id = ?1 AND user_id = ?2",
                [id, user_id],
            )?;
            conn.execute(
                "DELETE FROM players WHERE team_id = ?1 AND user_id = ?2",
                [id, user_id],
            )?;
            let changed = conn.execute(
                "DELETE FROM teams WHERE id = ?1 AND user_id = ?2",
                [id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Players --

    #[allow(clippy::too_many_arguments)]
    pub fn create_player(
        &self,
        id: &str,
        team_id: &str,
        user_id: &str,
        encrypted_name: &str,
        position: Option<&str>,
        shirt_number: Option<u8>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO players (id, team_id, user_id, encrypted_name, position, shirt_number)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, team_id, user_id, encrypted_name, position, shirt_number],
            )?;
            Ok(())
        })
    }

    pub fn list_players(&self, user_id: &str, team_id: &str) -> Result<Vec<PlayerRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, team_id, user_id, encrypted_name, position, shirt_number, created_at
                 FROM players WHERE team_id = ?1 AND user_id = ?2 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([team_id, user_id], map_player)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_player(
        &self,
        user_id: &str,
        id: &str,
        encrypted_name: Option<&str>,
        position: Option<&str>,
        shirt_number: Option<u8>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE players SET
                     encrypted_name = COALESCE(?3, encrypted_name),
                     position       = COALESCE(?4, position),
                     shirt_number   = COALESCE(?5, shirt_number)
                 WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id, user_id, encrypted_name, position, shirt_number],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_player(&self, user_id: &str, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "DELETE FROM players WHERE id = ?1 AND user_id = ?2",
                [id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Matches --

    #[allow(clippy::too_many_arguments)]
    pub fn create_match(
        &self,
        id: &str,
        user_id: &str,
        team_id: &str,
        opponent: &str,
        date: DateTime<Utc>,
        venue: Option<&str>,
        match_type: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            // Team must belong to the same user; the FK alone doesn't enforce that.
            let owns: i64 = conn.query_row(
                "SELECT COUNT(*) FROM teams WHERE id = ?1 AND user_id = ?2",
                [team_id, user_id],
                |r| r.get(0),
            )?;
            if owns == 0 {
                return Err(anyhow!("Team {} not owned by user {}", team_id, user_id));
            }

            conn.execute(
                "INSERT INTO matches (id, user_id, team_id, opponent, date, venue, match_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![id, user_id, team_id, opponent, fmt_ts(date), venue, match_type],
            )?;
            Ok(())
        })
    }

    pub fn list_matches(&self, user_id: &str) -> Result<Vec<MatchRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, team_id, opponent, date, venue, match_type,
                        is_finished, notification_sent, notification_sent_at, created_at
                 FROM matches WHERE user_id = ?1 ORDER BY date",
            )?;
            let rows = stmt
                .query_map([user_id], map_match)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_match(&self, user_id: &str, id: &str) -> Result<Option<MatchRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, team_id, opponent, date, venue, match_type,
                        is_finished, notification_sent, notification_sent_at, created_at
                 FROM matches WHERE id = ?1 AND user_id = ?2",
                [id, user_id],
                map_match,
            )
            .optional()
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_match(
        &self,
        user_id: &str,
        id: &str,
        opponent: Option<&str>,
        date: Option<DateTime<Utc>>,
        venue: Option<&str>,
        match_type: Option<&str>,
        is_finished: Option<bool>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE matches SET
                     opponent    = COALESCE(?3, opponent),
                     date        = COALESCE(?4, date),
                     venue       = COALESCE(?5, venue),
                     match_type  = COALESCE(?6, match_type),
                     is_finished = COALESCE(?7, is_finished)
                 WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![
                    id,
                    user_id,
                    opponent,
                    date.map(fmt_ts),
                    venue,
                    match_type,
                    is_finished
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_match(&self, user_id: &str, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "DELETE FROM matches WHERE id = ?1 AND user_id = ?2",
                [id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Reminder scan --

    /// Candidates for the due-scan: unfinished, un-notified matches starting
    /// inside `[window_start, window_end]`, joined with the owner's
    /// notification preferences.
    pub fn find_due_matches(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<DueMatchRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.user_id, m.opponent, m.date, m.venue, m.match_type,
                        u.push_enabled, u.push_token, u.email_enabled,
                        u.encrypted_email, u.encrypted_name
                 FROM matches m
                 JOIN users u ON m.user_id = u.id
                 WHERE m.is_finished = 0
                   AND m.notification_sent = 0
                   AND m.date BETWEEN ?1 AND ?2
                 ORDER BY m.date",
            )?;
            let rows = stmt
                .query_map([fmt_ts(window_start), fmt_ts(window_end)], |row| {
                    Ok(DueMatchRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        opponent: row.get(2)?,
                        date: row.get(3)?,
                        venue: row.get(4)?,
                        match_type: row.get(5)?,
                        push_enabled: row.get(6)?,
                        push_token: row.get(7)?,
                        email_enabled: row.get(8)?,
                        encrypted_email: row.get(9)?,
                        encrypted_name: row.get(10)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Conditional mark-as-handled. Returns true only if this call performed
    /// the transition; a second caller (or an overlapping scan) gets false.
    /// This single statement is the engine's whole concurrency story — two
    /// racing scans resolve here, not in application code.
    pub fn mark_notified(&self, match_id: &str, sent_at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE matches
                 SET notification_sent = 1, notification_sent_at = ?2
                 WHERE id = ?1 AND notification_sent = 0",
                rusqlite::params![match_id, fmt_ts(sent_at)],
            )?;
            Ok(changed > 0)
        })
    }
}

fn map_team(row: &rusqlite::Row<'_>) -> rusqlite::Result<TeamRow> {
    Ok(TeamRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        encrypted_name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn map_player(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlayerRow> {
    Ok(PlayerRow {
        id: row.get(0)?,
        team_id: row.get(1)?,
        user_id: row.get(2)?,
        encrypted_name: row.get(3)?,
        position: row.get(4)?,
        shirt_number: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_match(row: &rusqlite::Row<'_>) -> rusqlite::Result<MatchRow> {
    Ok(MatchRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        team_id: row.get(2)?,
        opponent: row.get(3)?,
        date: row.get(4)?,
        venue: row.get(5)?,
        match_type: row.get(6)?,
        is_finished: row.get(7)?,
        notification_sent: row.get(8)?,
        notification_sent_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn query_user(conn: &Connection, sql: &str, param: &str) -> Result<Option<UserRow>> {
    conn.query_row(sql, [param], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            username: row.get(1)?,
            password: row.get(2)?,
            encrypted_email: row.get(3)?,
            encrypted_name: row.get(4)?,
            push_enabled: row.get(5)?,
            push_token: row.get(6)?,
            email_enabled: row.get(7)?,
            created_at: row.get(8)?,
        })
    })
    .optional()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seed(db: &Database) -> (String, String) {
        db.create_user("u-1", "coach", "hash", Some("enc-email"), Some("enc-name"))
            .unwrap();
        db.create_team("t-1", "u-1", "enc-team").unwrap();
        ("u-1".into(), "t-1".into())
    }

    #[test]
    fn mark_notified_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let (user, team) = seed(&db);
        let kickoff = Utc::now() + Duration::minutes(10);
        db.create_match("m-1", &user, &team, "Rovers", kickoff, None, None)
            .unwrap();

        let now = Utc::now();
        assert!(db.mark_notified("m-1", now).unwrap());
        // Second transition attempt must report that nothing changed.
        assert!(!db.mark_notified("m-1", now).unwrap());

        let m = db.get_match(&user, "m-1").unwrap().unwrap();
        assert!(m.notification_sent);
        assert!(m.notification_sent_at.is_some());
    }

    #[test]
    fn due_query_applies_window_and_flags() {
        let db = Database::open_in_memory().unwrap();
        let (user, team) = seed(&db);
        let now = Utc::now();

        db.create_match("in-window", &user, &team, "A", now + Duration::minutes(7), None, None)
            .unwrap();
        db.create_match("too-far", &user, &team, "B", now + Duration::minutes(20), None, None)
            .unwrap();
        db.create_match("past", &user, &team, "C", now - Duration::minutes(5), None, None)
            .unwrap();
        db.create_match("finished", &user, &team, "D", now + Duration::minutes(8), None, None)
            .unwrap();
        db.update_match(&user, "finished", None, None, None, None, Some(true))
            .unwrap();
        db.create_match("already-sent", &user, &team, "E", now + Duration::minutes(9), None, None)
            .unwrap();
        db.mark_notified("already-sent", now).unwrap();

        let due = db
            .find_due_matches(now + Duration::minutes(5), now + Duration::minutes(15))
            .unwrap();
        let ids: Vec<&str> = due.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["in-window"]);

        // The same 7-minute match is not a candidate under a [10, 11] window.
        let tight = db
            .find_due_matches(now + Duration::minutes(10), now + Duration::minutes(11))
            .unwrap();
        assert!(tight.is_empty());
    }

    #[test]
    fn due_query_carries_owner_preferences() {
        let db = Database::open_in_memory().unwrap();
        let (user, team) = seed(&db);
        db.update_settings(&user, Some(true), Some("ExponentPushToken[abc]"), Some(true))
            .unwrap();
        let now = Utc::now();
        db.create_match("m-1", &user, &team, "Rovers", now + Duration::minutes(10), None, None)
            .unwrap();

        let due = db
            .find_due_matches(now + Duration::minutes(5), now + Duration::minutes(15))
            .unwrap();
        assert_eq!(due.len(), 1);
        let d = &due[0];
        assert!(d.push_enabled);
        assert_eq!(d.push_token.as_deref(), Some("ExponentPushToken[abc]"));
        assert!(d.email_enabled);
        assert_eq!(d.encrypted_email.as_deref(), Some("enc-email"));
    }

    #[test]
    fn queries_are_tenant_scoped() {
        let db = Database::open_in_memory().unwrap();
        let (user, _) = seed(&db);
        db.create_user("u-2", "rival", "hash", None, None).unwrap();
        db.create_team("t-2", "u-2", "enc-other").unwrap();

        assert_eq!(db.list_teams(&user).unwrap().len(), 1);
        assert!(db.get_team(&user, "t-2").unwrap().is_none());
        assert!(!db.delete_team(&user, "t-2").unwrap());
        // Still there for its owner.
        assert!(db.get_team("u-2", "t-2").unwrap().is_some());
    }

    #[test]
    fn match_requires_owned_team() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.create_user("u-2", "rival", "hash", None, None).unwrap();

        let res = db.create_match(
            "m-x",
            "u-2",
            "t-1",
            "Rovers",
            Utc::now(),
            None,
            None,
        );
        assert!(res.is_err());
    }
}

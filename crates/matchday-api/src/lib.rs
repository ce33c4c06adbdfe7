pub mod auth;
pub mod matches;
pub mod middleware;
pub mod notifications;
pub mod players;
pub mod settings;
pub mod teams;

use tracing::warn;
use uuid::Uuid;

/// Parse a stored UUID column, logging rather than failing the response.
pub(crate) fn parse_row_uuid(raw: &str, context: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", context, raw, e);
        Uuid::default()
    })
}

/// Parse a stored timestamp. SQLite's `datetime('now')` default writes
/// "YYYY-MM-DD HH:MM:SS" without a timezone; engine-written columns are
/// RFC 3339. Accept both.
pub(crate) fn parse_row_ts(raw: &str, context: &str) -> chrono::DateTime<chrono::Utc> {
    raw.parse::<chrono::DateTime<chrono::Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}': {}", context, raw, e);
            chrono::DateTime::default()
        })
}

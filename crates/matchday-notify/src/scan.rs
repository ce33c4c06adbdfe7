//! The match due-scan.
//!
//! One pass: query matches whose kickoff falls inside the due window, attempt
//! every enabled channel for each candidate, and conditionally mark the match
//! notified. The mark is the only mutation this module performs.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use matchday_crypto::FieldCipher;
use matchday_db::models::DueMatchRow;
use matchday_db::{Database, parse_ts};
use matchday_types::models::ScanOutcome;

use crate::channel::{ChannelError, EmailSender, PushSender};

/// Default per-channel send budget. One slow provider must not stall the scan.
const DEFAULT_SEND_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// The due window, as minute offsets from the scan's start time.
///
/// The wide default tolerates a scheduler ticking every few minutes without
/// ever missing a match; the `notification_sent` flag absorbs the repeat
/// candidacy that width causes.
#[derive(Debug, Clone, Copy)]
pub struct ScanWindow {
    pub low_minutes: i64,
    pub high_minutes: i64,
}

impl ScanWindow {
    pub fn new(low_minutes: i64, high_minutes: i64) -> Self {
        Self { low_minutes, high_minutes }
    }

    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            now + Duration::minutes(self.low_minutes),
            now + Duration::minutes(self.high_minutes),
        )
    }
}

impl Default for ScanWindow {
    fn default() -> Self {
        Self::new(5, 15)
    }
}

/// Drives one reminder pass over the due window.
///
/// Holds its collaborators explicitly — store, cipher, channel senders — so
/// tests substitute fakes per instance instead of sharing process state.
pub struct ReminderEngine {
    db: Arc<Database>,
    cipher: FieldCipher,
    push: Arc<dyn PushSender>,
    email: Arc<dyn EmailSender>,
    window: ScanWindow,
    send_timeout: StdDuration,
}

impl ReminderEngine {
    pub fn new(
        db: Arc<Database>,
        cipher: FieldCipher,
        push: Arc<dyn PushSender>,
        email: Arc<dyn EmailSender>,
        window: ScanWindow,
    ) -> Self {
        Self {
            db,
            cipher,
            push,
            email,
            window,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, timeout: StdDuration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Run exactly one scan. Also the manual-trigger entry point.
    ///
    /// Only a failure of the initial candidate query aborts the scan; every
    /// per-candidate failure is isolated, logged, and counted.
    pub async fn run_scan_once(&self) -> anyhow::Result<ScanOutcome> {
        let now = Utc::now();
        let (window_start, window_end) = self.window.bounds(now);

        let db = self.db.clone();
        let candidates = tokio::task::spawn_blocking(move || {
            db.find_due_matches(window_start, window_end)
        })
        .await??;

        let mut outcome = ScanOutcome::default();
        for candidate in &candidates {
            outcome.checked += 1;
            match self.process_candidate(candidate, now).await {
                Ok(true) => outcome.notified += 1,
                Ok(false) => outcome.failed += 1,
                Err(e) => {
                    warn!(match_id = %candidate.id, "Skipping candidate after store error: {e}");
                    outcome.failed += 1;
                }
            }
        }

        if outcome.checked > 0 {
            info!(
                checked = outcome.checked,
                notified = outcome.notified,
                failed = outcome.failed,
                "Reminder scan complete"
            );
        }
        Ok(outcome)
    }

    /// Returns `Ok(true)` when the match ended up marked notified, `Ok(false)`
    /// when it was attempted-and-failed and stays eligible for the next
    /// in-window scan. `Err` is a store failure for this candidate only.
    async fn process_candidate(&self, c: &DueMatchRow, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut push_attempted = false;
        let mut push_ok = false;
        if c.push_enabled {
            if let Some(token) = c.push_token.as_deref().filter(|t| !t.is_empty()) {
                push_attempted = true;
                push_ok = self.attempt_push(c, token).await;
            }
        }

        let mut email_attempted = false;
        let mut email_ok = false;
        if c.email_enabled {
            if let Some(encrypted) = c.encrypted_email.as_deref().filter(|e| !e.is_empty()) {
                // Decrypted address lives only inside this block and is
                // never logged.
                match self.cipher.decrypt(encrypted) {
                    Ok(address) if !address.is_empty() => {
                        email_attempted = true;
                        email_ok = self.attempt_email(c, &address).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // Undecryptable address is permanent, not transient:
                        // the channel is skipped, not retried.
                        warn!(match_id = %c.id, "Skipping email channel: {e}");
                    }
                }
            }
        }

        let delivered = push_ok || email_ok;
        let attempted = push_attempted || email_attempted;

        if delivered || !attempted {
            // Nothing-to-attempt candidates are marked too; leaving them
            // unmarked would make every future scan loop on them.
            let db = self.db.clone();
            let id = c.id.clone();
            let marked = tokio::task::spawn_blocking(move || db.mark_notified(&id, now)).await??;
            if !marked {
                debug!(match_id = %c.id, "Already marked by a concurrent scan");
            }
            Ok(true)
        } else {
            debug!(
                match_id = %c.id,
                "All attempted channels failed; match stays eligible until it leaves the window"
            );
            Ok(false)
        }
    }

    async fn attempt_push(&self, c: &DueMatchRow, token: &str) -> bool {
        let (title, body) = render_push(c);
        let data = serde_json::json!({ "matchId": c.id, "kind": "match_reminder" });

        let send = self.push.send(token, &title, &body, data);
        let result = match tokio::time::timeout(self.send_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout(self.send_timeout)),
        };

        match result {
            Ok(receipt) => {
                debug!(match_id = %c.id, ticket = ?receipt.id, "Push accepted");
                true
            }
            Err(e) => {
                warn!(match_id = %c.id, "Push delivery failed: {e}");
                false
            }
        }
    }

    async fn attempt_email(&self, c: &DueMatchRow, address: &str) -> bool {
        // Name decryption is best-effort; a reminder without the
        // salutation still beats no reminder.
        let name = c
            .encrypted_name
            .as_deref()
            .and_then(|enc| self.cipher.decrypt(enc).ok())
            .filter(|n| !n.is_empty());

        let (subject, text, html) = render_email(c, name.as_deref());

        let send = self.email.send(address, &subject, &text, &html);
        let result = match tokio::time::timeout(self.send_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout(self.send_timeout)),
        };

        match result {
            Ok(receipt) => {
                debug!(match_id = %c.id, message_id = %receipt.id, "Reminder email accepted");
                true
            }
            Err(e) => {
                warn!(match_id = %c.id, "Email delivery failed: {e}");
                false
            }
        }
    }
}

fn kickoff_label(c: &DueMatchRow) -> String {
    parse_ts(&c.date)
        .map(|d| d.format("%H:%M UTC").to_string())
        .unwrap_or_else(|_| "soon".into())
}

fn render_push(c: &DueMatchRow) -> (String, String) {
    let title = match c.match_type.as_deref() {
        Some(kind) if !kind.is_empty() => format!("{kind} reminder"),
        _ => "Match reminder".to_string(),
    };
    let mut body = format!("vs {} at {}", c.opponent, kickoff_label(c));
    if let Some(venue) = c.venue.as_deref().filter(|v| !v.is_empty()) {
        body.push_str(&format!(" — {venue}"));
    }
    (title, body)
}

fn render_email(c: &DueMatchRow, name: Option<&str>) -> (String, String, String) {
    let subject = format!("Upcoming match vs {}", c.opponent);
    let salutation = name.unwrap_or("there");
    let when = kickoff_label(c);
    let venue_line = c
        .venue
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(|v| format!("Venue: {v}\n"))
        .unwrap_or_default();

    let text = format!(
        "Hi {salutation},\n\nYour match against {} kicks off at {when}.\n{venue_line}\nGood luck!\n",
        c.opponent
    );
    let html = format!(
        "<p>Hi {salutation},</p><p>Your match against <strong>{}</strong> kicks off at {when}.</p>{}<p>Good luck!</p>",
        c.opponent,
        c.venue
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(|v| format!("<p>Venue: {v}</p>"))
            .unwrap_or_default()
    );
    (subject, text, html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{EmailReceipt, PushReceipt};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakePush {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl PushSender for FakePush {
        async fn send(
            &self,
            token: &str,
            _title: &str,
            _body: &str,
            _data: Value,
        ) -> Result<PushReceipt, ChannelError> {
            self.calls.lock().unwrap().push(token.to_string());
            if self.fail {
                Err(ChannelError::Rejected("DeviceNotRegistered".into()))
            } else {
                Ok(PushReceipt { id: Some("ticket-1".into()) })
            }
        }
    }

    #[derive(Default)]
    struct FakeEmail {
        calls: Mutex<Vec<String>>,
        fail: bool,
        delay: Option<StdDuration>,
    }

    #[async_trait]
    impl EmailSender for FakeEmail {
        async fn send(
            &self,
            to: &str,
            _subject: &str,
            _text: &str,
            _html: &str,
        ) -> Result<EmailReceipt, ChannelError> {
            self.calls.lock().unwrap().push(to.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                Err(ChannelError::Build("boom".into()))
            } else {
                Ok(EmailReceipt { id: "msg-1".into() })
            }
        }
    }

    const SECRET: &str = "scan-test-secret";

    fn cipher() -> FieldCipher {
        FieldCipher::new(SECRET).unwrap()
    }

    struct Fixture {
        db: Arc<Database>,
        push: Arc<FakePush>,
        email: Arc<FakeEmail>,
    }

    impl Fixture {
        fn new(push: FakePush, email: FakeEmail) -> Self {
            Self {
                db: Arc::new(Database::open_in_memory().unwrap()),
                push: Arc::new(push),
                email: Arc::new(email),
            }
        }

        fn engine(&self) -> ReminderEngine {
            ReminderEngine::new(
                self.db.clone(),
                cipher(),
                self.push.clone(),
                self.email.clone(),
                ScanWindow::default(),
            )
            .with_send_timeout(StdDuration::from_millis(100))
        }

        /// User with the given preferences plus one match 8 minutes out.
        fn seed(
            &self,
            push_enabled: bool,
            push_token: Option<&str>,
            email_enabled: bool,
            encrypted_email: Option<&str>,
        ) {
            self.db
                .create_user("u-1", "coach", "hash", encrypted_email, None)
                .unwrap();
            self.db
                .update_settings("u-1", Some(push_enabled), push_token, Some(email_enabled))
                .unwrap();
            self.db.create_team("t-1", "u-1", "enc-team").unwrap();
            self.db
                .create_match(
                    "m-1",
                    "u-1",
                    "t-1",
                    "Rovers",
                    Utc::now() + Duration::minutes(8),
                    Some("Home ground"),
                    None,
                )
                .unwrap();
        }
    }

    #[tokio::test]
    async fn scan_notifies_once_and_never_again() {
        let fx = Fixture::new(FakePush::default(), FakeEmail::default());
        fx.seed(true, Some("ExponentPushToken[ok]"), false, None);
        let engine = fx.engine();

        let first = engine.run_scan_once().await.unwrap();
        assert_eq!(first, ScanOutcome { checked: 1, notified: 1, failed: 0 });

        // The match is still in-window, but already marked.
        let second = engine.run_scan_once().await.unwrap();
        assert_eq!(second.checked, 0);
        assert_eq!(fx.push.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn partial_channel_success_still_marks_handled() {
        let enc_email = cipher().encrypt("coach@example.com").unwrap();
        let fx = Fixture::new(
            FakePush::default(),
            FakeEmail { fail: true, ..Default::default() },
        );
        fx.seed(true, Some("ExponentPushToken[ok]"), true, Some(&enc_email));

        let outcome = fx.engine().run_scan_once().await.unwrap();
        // Push delivered, so the candidate counts as notified; the email
        // failure surfaces only in the logs.
        assert_eq!(outcome, ScanOutcome { checked: 1, notified: 1, failed: 0 });

        let m = fx.db.get_match("u-1", "m-1").unwrap().unwrap();
        assert!(m.notification_sent);
        assert_eq!(fx.email.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_channel_candidate_is_still_marked() {
        let fx = Fixture::new(FakePush::default(), FakeEmail::default());
        fx.seed(false, None, false, None);

        let outcome = fx.engine().run_scan_once().await.unwrap();
        assert_eq!(outcome, ScanOutcome { checked: 1, notified: 1, failed: 0 });

        let m = fx.db.get_match("u-1", "m-1").unwrap().unwrap();
        assert!(m.notification_sent);
        assert!(fx.push.calls.lock().unwrap().is_empty());
        assert!(fx.email.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn enabled_channel_without_destination_is_not_an_attempt() {
        let fx = Fixture::new(FakePush::default(), FakeEmail::default());
        fx.seed(true, None, false, None);

        let outcome = fx.engine().run_scan_once().await.unwrap();
        assert_eq!(outcome, ScanOutcome { checked: 1, notified: 1, failed: 0 });
        assert!(fx.push.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_attempt_is_retried_on_the_next_scan() {
        let fx = Fixture::new(FakePush { fail: true, ..Default::default() }, FakeEmail::default());
        fx.seed(true, Some("ExponentPushToken[ok]"), false, None);
        let engine = fx.engine();

        let first = engine.run_scan_once().await.unwrap();
        assert_eq!(first, ScanOutcome { checked: 1, notified: 0, failed: 1 });
        let m = fx.db.get_match("u-1", "m-1").unwrap().unwrap();
        assert!(!m.notification_sent);

        // Still in-window, still unmarked, so the next scan retries.
        let second = engine.run_scan_once().await.unwrap();
        assert_eq!(second.checked, 1);
        assert_eq!(fx.push.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn out_of_window_match_is_not_a_candidate() {
        let fx = Fixture::new(FakePush::default(), FakeEmail::default());
        fx.db.create_user("u-1", "coach", "hash", None, None).unwrap();
        fx.db.update_settings("u-1", Some(true), Some("ExponentPushToken[ok]"), None)
            .unwrap();
        fx.db.create_team("t-1", "u-1", "enc-team").unwrap();
        fx.db
            .create_match("m-far", "u-1", "t-1", "Rovers", Utc::now() + Duration::minutes(20), None, None)
            .unwrap();

        let outcome = fx.engine().run_scan_once().await.unwrap();
        assert_eq!(outcome.checked, 0);
        assert!(fx.push.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn undecryptable_email_skips_channel_and_marks() {
        // Ciphertext produced under a different secret fails authentication.
        let foreign = FieldCipher::new("some-other-secret")
            .unwrap()
            .encrypt("coach@example.com")
            .unwrap();
        let fx = Fixture::new(FakePush::default(), FakeEmail::default());
        fx.seed(false, None, true, Some(&foreign));

        let outcome = fx.engine().run_scan_once().await.unwrap();
        // The broken channel is skipped, nothing else was attemptable, so the
        // match is marked rather than looping forever.
        assert_eq!(outcome, ScanOutcome { checked: 1, notified: 1, failed: 0 });
        assert!(fx.email.calls.lock().unwrap().is_empty());
        let m = fx.db.get_match("u-1", "m-1").unwrap().unwrap();
        assert!(m.notification_sent);
    }

    #[tokio::test]
    async fn slow_send_is_treated_as_a_failed_attempt() {
        let enc_email = cipher().encrypt("coach@example.com").unwrap();
        let fx = Fixture::new(
            FakePush::default(),
            FakeEmail { delay: Some(StdDuration::from_secs(5)), ..Default::default() },
        );
        fx.seed(false, None, true, Some(&enc_email));

        let outcome = fx.engine().run_scan_once().await.unwrap();
        assert_eq!(outcome, ScanOutcome { checked: 1, notified: 0, failed: 1 });
        let m = fx.db.get_match("u-1", "m-1").unwrap().unwrap();
        assert!(!m.notification_sent);
    }

    #[test]
    fn push_body_mentions_opponent_and_venue() {
        let row = DueMatchRow {
            id: "m-1".into(),
            user_id: "u-1".into(),
            opponent: "Rovers".into(),
            date: "2026-09-01T18:30:00Z".into(),
            venue: Some("Home ground".into()),
            match_type: Some("Cup".into()),
            push_enabled: true,
            push_token: None,
            email_enabled: false,
            encrypted_email: None,
            encrypted_name: None,
        };
        let (title, body) = render_push(&row);
        assert_eq!(title, "Cup reminder");
        assert!(body.contains("Rovers"));
        assert!(body.contains("18:30"));
        assert!(body.contains("Home ground"));
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::scan::ReminderEngine;

/// Drives the reminder engine on a fixed cadence.
///
/// `start` runs one scan immediately and then one per tick. `stop` cancels
/// future ticks only; a scan already in flight always runs to completion,
/// because cancellation is observed solely at the tick await point.
pub struct Scheduler;

pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Scheduler {
    pub fn start(engine: Arc<ReminderEngine>, every: Duration) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let tick_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            // The first tick completes immediately.
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = tick_cancel.cancelled() => {
                        info!("Reminder scheduler stopped");
                        break;
                    }
                    _ = interval.tick() => {}
                }

                match engine.run_scan_once().await {
                    Ok(outcome) if outcome.checked > 0 => {
                        info!(
                            checked = outcome.checked,
                            notified = outcome.notified,
                            failed = outcome.failed,
                            "Scheduled reminder scan"
                        );
                    }
                    Ok(_) => {}
                    // A failed scan never kills the loop; the next tick retries.
                    Err(e) => warn!("Reminder scan failed: {e}"),
                }
            }
        });

        SchedulerHandle { cancel, task }
    }
}

impl SchedulerHandle {
    /// Cancel future ticks and wait for the loop (including any in-flight
    /// scan) to wind down.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelError, EmailReceipt, EmailSender, PushReceipt, PushSender};
    use crate::scan::ScanWindow;
    use async_trait::async_trait;
    use chrono::Utc;
    use matchday_crypto::FieldCipher;
    use matchday_db::Database;
    use serde_json::Value;

    struct OkPush;

    #[async_trait]
    impl PushSender for OkPush {
        async fn send(
            &self,
            _token: &str,
            _title: &str,
            _body: &str,
            _data: Value,
        ) -> Result<PushReceipt, ChannelError> {
            Ok(PushReceipt { id: None })
        }
    }

    struct OkEmail;

    #[async_trait]
    impl EmailSender for OkEmail {
        async fn send(
            &self,
            _to: &str,
            _subject: &str,
            _text: &str,
            _html: &str,
        ) -> Result<EmailReceipt, ChannelError> {
            Ok(EmailReceipt { id: "msg".into() })
        }
    }

    fn engine_with_one_due_match() -> (Arc<Database>, Arc<ReminderEngine>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_user("u-1", "coach", "hash", None, None).unwrap();
        db.update_settings("u-1", Some(true), Some("ExponentPushToken[ok]"), None)
            .unwrap();
        db.create_team("t-1", "u-1", "enc-team").unwrap();
        db.create_match(
            "m-1",
            "u-1",
            "t-1",
            "Rovers",
            Utc::now() + chrono::Duration::minutes(8),
            None,
            None,
        )
        .unwrap();

        let engine = Arc::new(ReminderEngine::new(
            db.clone(),
            FieldCipher::new("scheduler-test-secret").unwrap(),
            Arc::new(OkPush),
            Arc::new(OkEmail),
            ScanWindow::default(),
        ));
        (db, engine)
    }

    #[tokio::test]
    async fn start_runs_a_scan_immediately() {
        let (db, engine) = engine_with_one_due_match();

        // An hour-long interval means only the immediate first tick can fire.
        let handle = Scheduler::start(engine, Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.stop().await;

        let m = db.get_match("u-1", "m-1").unwrap().unwrap();
        assert!(m.notification_sent);
    }

    #[tokio::test]
    async fn stop_resolves_promptly_between_ticks() {
        let (_db, engine) = engine_with_one_due_match();
        let handle = Scheduler::start(engine, Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Must not wait for the next tick (an hour away).
        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .expect("stop() should resolve without waiting for a tick");
    }
}

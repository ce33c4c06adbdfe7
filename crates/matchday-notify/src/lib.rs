//! Matchday reminder engine.
//!
//! A recurring scan finds matches about to kick off, notifies the owning user
//! on every enabled channel (push, email), and records an idempotent
//! notified mark so no match is ever reminded twice. PII is decrypted only
//! while the outbound message is being built.

pub mod channel;
pub mod scan;
pub mod scheduler;

pub use channel::{ChannelError, EmailSender, PushSender, SmtpEmail, ExpoPush};
pub use scan::{ReminderEngine, ScanWindow};
pub use scheduler::{Scheduler, SchedulerHandle};

//! Matchday field-level crypto.
//!
//! PII columns (user email, user display name, team and player names) never
//! hit the database as plaintext. Each value is encrypted on its own with a
//! per-call salt and nonce, so the stored strings are self-describing and two
//! encryptions of the same plaintext never collide.

pub mod cipher;
pub mod fields;

pub use cipher::{CipherError, FieldCipher};

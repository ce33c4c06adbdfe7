use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

/// Per-value random salt fed into the KDF.
const SALT_LEN: usize = 16;
/// AES-GCM nonce (96-bit, the size the cipher standardizes on).
const NONCE_LEN: usize = 12;
/// GCM authentication tag.
const TAG_LEN: usize = 16;
/// Derived AES-256 key.
const KEY_LEN: usize = 32;
/// PBKDF2-HMAC-SHA256 rounds. Slow on purpose; field writes are rare.
const PBKDF2_ROUNDS: u32 = 100_000;

/// Environment variable holding the process-wide field secret.
pub const SECRET_ENV: &str = "MATCHDAY_FIELD_SECRET";

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// The field secret is unset or blank. There is no fallback key —
    /// refusing to encrypt beats silently using a known default.
    #[error("field encryption secret is not configured (set {SECRET_ENV})")]
    MissingSecret,

    /// The stored value is malformed or failed tag verification. No partial
    /// plaintext is ever returned.
    #[error("encrypted value failed integrity check: {0}")]
    Integrity(&'static str),

    /// The AEAD encrypt call itself failed.
    #[error("encryption failed")]
    Encrypt,
}

/// Encrypts and decrypts single string fields with AES-256-GCM under a key
/// derived from the configured secret.
///
/// Constructed explicitly and passed to whoever needs it — handlers, the
/// reminder engine — so tests can build one with their own secret instead of
/// sharing process state.
///
/// Wire format: `base64(salt || nonce || tag || ciphertext)`.
#[derive(Clone)]
pub struct FieldCipher {
    secret: String,
}

impl FieldCipher {
    pub fn new(secret: impl Into<String>) -> Result<Self, CipherError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(CipherError::MissingSecret);
        }
        Ok(Self { secret })
    }

    /// Read the secret from the environment at call time, not process start,
    /// so a test or a rotated deployment sees the current value.
    pub fn from_env() -> Result<Self, CipherError> {
        let secret = std::env::var(SECRET_ENV).unwrap_or_default();
        Self::new(secret)
    }

    /// Encrypt a field value. Empty input passes through unchanged — optional
    /// columns stay empty instead of becoming ciphertext of nothing.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let key = self.derive_key(&salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let nonce = Nonce::from_slice(&nonce_bytes);

        // aes-gcm appends the tag to the ciphertext; the stored layout keeps
        // the tag in the fixed-length prefix instead.
        let sealed = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + TAG_LEN + ciphertext.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(tag);
        out.extend_from_slice(ciphertext);

        Ok(BASE64.encode(out))
    }

    /// Decrypt a stored field value. Empty input passes through unchanged.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        if encoded.is_empty() {
            return Ok(String::new());
        }

        let raw = BASE64
            .decode(encoded)
            .map_err(|_| CipherError::Integrity("not valid base64"))?;
        if raw.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
            return Err(CipherError::Integrity("value shorter than header"));
        }

        let (salt, rest) = raw.split_at(SALT_LEN);
        let (nonce_bytes, rest) = rest.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let key = self.derive_key(salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let nonce = Nonce::from_slice(nonce_bytes);

        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        let plaintext = cipher
            .decrypt(nonce, sealed.as_slice())
            .map_err(|_| CipherError::Integrity("tag verification failed"))?;

        String::from_utf8(plaintext).map_err(|_| CipherError::Integrity("plaintext not UTF-8"))
    }

    fn derive_key(&self, salt: &[u8]) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(self.secret.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> FieldCipher {
        FieldCipher::new("test-field-secret").unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let c = cipher();
        let encoded = c.encrypt("ada@example.com").unwrap();
        assert_ne!(encoded, "ada@example.com");
        assert_eq!(c.decrypt(&encoded).unwrap(), "ada@example.com");
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let c = cipher();
        let a = c.encrypt("Riverside FC").unwrap();
        let b = c.encrypt("Riverside FC").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_value_passes_through() {
        let c = cipher();
        assert_eq!(c.encrypt("").unwrap(), "");
        assert_eq!(c.decrypt("").unwrap(), "");
    }

    #[test]
    fn wrong_secret_fails() {
        let encoded = cipher().encrypt("secret@example.com").unwrap();
        let other = FieldCipher::new("a-different-secret").unwrap();
        assert!(matches!(
            other.decrypt(&encoded),
            Err(CipherError::Integrity(_))
        ));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let c = cipher();
        let encoded = c.encrypt("tamper me please").unwrap();
        let mut raw = BASE64.decode(&encoded).unwrap();

        // Flip one bit in the ciphertext region (past the fixed header).
        let idx = SALT_LEN + NONCE_LEN + TAG_LEN;
        raw[idx] ^= 0x01;
        let mangled = BASE64.encode(&raw);

        assert!(matches!(
            c.decrypt(&mangled),
            Err(CipherError::Integrity(_))
        ));
    }

    #[test]
    fn tampered_tag_fails() {
        let c = cipher();
        let encoded = c.encrypt("tag flip").unwrap();
        let mut raw = BASE64.decode(&encoded).unwrap();

        raw[SALT_LEN + NONCE_LEN] ^= 0x80;
        let mangled = BASE64.encode(&raw);

        assert!(matches!(
            c.decrypt(&mangled),
            Err(CipherError::Integrity(_))
        ));
    }

    #[test]
    fn truncated_value_fails() {
        let c = cipher();
        let short = BASE64.encode([0u8; SALT_LEN + NONCE_LEN]);
        assert!(matches!(c.decrypt(&short), Err(CipherError::Integrity(_))));
    }

    #[test]
    fn garbage_input_fails() {
        let c = cipher();
        assert!(matches!(
            c.decrypt("!!! not base64 !!!"),
            Err(CipherError::Integrity(_))
        ));
    }

    #[test]
    fn blank_secret_rejected() {
        assert!(matches!(
            FieldCipher::new(""),
            Err(CipherError::MissingSecret)
        ));
    }

    #[test]
    fn unicode_roundtrip() {
        let c = cipher();
        let name = "Zoë Müller-Ødegård ⚽";
        let encoded = c.encrypt(name).unwrap();
        assert_eq!(c.decrypt(&encoded).unwrap(), name);
    }
}

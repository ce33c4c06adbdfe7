//! Notification delivery channels.
//!
//! Push goes over HTTP to an Expo-compatible endpoint; email goes over async
//! SMTP via `lettre`. Both sit behind object-safe traits so the reminder
//! engine can take fakes in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// HTTP request timeout for a single push delivery attempt.
const PUSH_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default Expo push API endpoint.
const DEFAULT_PUSH_ENDPOINT: &str = "https://exp.host/--/api/v2/push/send";

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `MATCHDAY_SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@matchday.local";

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The push provider returned a non-2xx status code.
    #[error("push provider returned HTTP {0}")]
    HttpStatus(u16),

    /// The push token does not look like a deliverable token.
    #[error("push token has invalid shape")]
    InvalidToken,

    /// The provider accepted the request but rejected this recipient.
    #[error("provider rejected delivery: {0}")]
    Rejected(String),

    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("email build error: {0}")]
    Build(String),

    /// The send did not complete within the engine's per-channel budget.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// Provider acknowledgement for one push delivery. Acceptance, not a
/// guarantee the device received it.
#[derive(Debug, Clone)]
pub struct PushReceipt {
    pub id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmailReceipt {
    pub id: String,
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: Value,
    ) -> Result<PushReceipt, ChannelError>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: &str,
    ) -> Result<EmailReceipt, ChannelError>;
}

// ── Push over Expo ──────────────────────────────────────────────────────

/// Push sender for Expo-format tokens.
pub struct ExpoPush {
    client: reqwest::Client,
    endpoint: String,
}

impl ExpoPush {
    pub fn new() -> Self {
        Self::with_endpoint(
            std::env::var("MATCHDAY_PUSH_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_PUSH_ENDPOINT.into()),
        )
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(PUSH_REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Expo tokens look like `ExponentPushToken[xxxx]`. Anything else is
    /// rejected before it costs a network round trip.
    fn token_is_valid(token: &str) -> bool {
        (token.starts_with("ExponentPushToken[") || token.starts_with("ExpoPushToken["))
            && token.ends_with(']')
    }
}

impl Default for ExpoPush {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushSender for ExpoPush {
    async fn send(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: Value,
    ) -> Result<PushReceipt, ChannelError> {
        if !Self::token_is_valid(token) {
            return Err(ChannelError::InvalidToken);
        }

        let payload = serde_json::json!({
            "to": token,
            "title": title,
            "body": body,
            "data": data,
            "sound": "default",
        });

        let response = self.client.post(&self.endpoint).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(ChannelError::HttpStatus(response.status().as_u16()));
        }

        // Expo wraps per-message tickets in a `data` object:
        // {"data": {"status": "ok", "id": "..."}} or {"status": "error", ...}.
        let ticket: Value = response.json().await?;
        let status = ticket
            .pointer("/data/status")
            .and_then(Value::as_str)
            .unwrap_or("ok");
        if status == "error" {
            let message = ticket
                .pointer("/data/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown provider error")
                .to_string();
            return Err(ChannelError::Rejected(message));
        }

        let id = ticket
            .pointer("/data/id")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(PushReceipt { id })
    }
}

// ── Email over SMTP ─────────────────────────────────────────────────────

/// Configuration for the SMTP email channel.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from_address: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl SmtpConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `MATCHDAY_SMTP_HOST` is not set, signalling that the
    /// email channel is not configured for this deployment.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("MATCHDAY_SMTP_HOST").ok()?;
        Some(Self {
            host,
            port: std::env::var("MATCHDAY_SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("MATCHDAY_SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            user: std::env::var("MATCHDAY_SMTP_USER").ok(),
            password: std::env::var("MATCHDAY_SMTP_PASSWORD").ok(),
        })
    }
}

/// Sends reminder emails via SMTP.
pub struct SmtpEmail {
    config: SmtpConfig,
}

impl SmtpEmail {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EmailSender for SmtpEmail {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: &str,
    ) -> Result<EmailReceipt, ChannelError> {
        use lettre::{
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
            message::{MultiPart, SinglePart, header::ContentType},
            transport::smtp::authentication::Credentials,
        };

        let email = Message::builder()
            .from(self.config.from_address.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )
            .map_err(|e| ChannelError::Build(e.to_string()))?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)?
                .port(self.config.port);

        if let (Some(user), Some(pass)) = (&self.config.user, &self.config.password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let mailer = transport_builder.build();
        let response = mailer.send(email).await?;

        Ok(EmailReceipt {
            id: response.code().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expo_token_shapes() {
        assert!(ExpoPush::token_is_valid("ExponentPushToken[abc123]"));
        assert!(ExpoPush::token_is_valid("ExpoPushToken[abc123]"));
        assert!(!ExpoPush::token_is_valid("abc123"));
        assert!(!ExpoPush::token_is_valid("ExponentPushToken[abc"));
        assert!(!ExpoPush::token_is_valid(""));
    }

    #[tokio::test]
    async fn invalid_token_is_rejected_without_network() {
        // Endpoint is unroutable; a network attempt would error differently.
        let push = ExpoPush::with_endpoint("http://127.0.0.1:1/push");
        let err = push
            .send("not-a-token", "t", "b", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidToken));
    }

    #[test]
    fn smtp_config_absent_without_host() {
        // SAFETY: test-only env mutation, no concurrent reader of this var.
        unsafe { std::env::remove_var("MATCHDAY_SMTP_HOST") };
        assert!(SmtpConfig::from_env().is_none());
    }

    #[test]
    fn channel_error_display() {
        let err = ChannelError::HttpStatus(502);
        assert_eq!(err.to_string(), "push provider returned HTTP 502");
        let err = ChannelError::Rejected("DeviceNotRegistered".into());
        assert!(err.to_string().contains("DeviceNotRegistered"));
    }
}

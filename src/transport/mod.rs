//! Delivery backends.
//!
//! Defines the [`Transport`] trait and the error type shared by every
//! implementation. Four transports ship with the crate:
//! - [`twilio::TwilioTransport`]: carrier REST API, one call per recipient
//! - [`failover::FailoverTransport`]: ordered chain, first success wins
//! - [`array::ArrayTransport`]: in-memory sink for tests and local debugging
//! - [`log::LogTransport`]: renders the message into a log sink
//!
//! A transport signals *soft* failure (the message was legitimately not sent)
//! with `Ok(None)` and *hard* failure with `Err`. The failover chain depends on
//! that distinction.

use async_trait::async_trait;
use regex::Regex;

use crate::message::{Message, SentMessage};

pub mod array;
pub mod failover;
pub mod log;
pub mod twilio;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by transports.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// HTTP transport failure.
    #[error("transport request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Upstream provider responded with an error status.
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitised response body.
        body: String,
    },
    /// Response did not match the expected schema.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// Provider-level rejection not tied to an HTTP status.
    #[error("provider rejected message: {0}")]
    Provider(String),
    /// Every transport in a failover chain failed.
    #[error("all transports failed ({attempted} attempted)")]
    Exhausted {
        /// Number of child transports that were tried.
        attempted: usize,
    },
    /// The transport cannot deliver with its current configuration.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A capability that delivers a [`Message`].
///
/// Implementations must not mutate or retain the message beyond the call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a message.
    ///
    /// Returns `Ok(Some(_))` on success and `Ok(None)` when the message was
    /// legitimately not sent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on hard failure.
    async fn send(&self, message: &Message) -> Result<Option<SentMessage>, TransportError>;

    /// Stable short name used for configuration keys and diagnostics.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Check HTTP response status and return body text or a structured error.
///
/// # Errors
///
/// Returns `TransportError::Request` on transport failure, `TransportError::HttpStatus` on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, TransportError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(TransportError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

/// Collapse whitespace, redact credentials, and truncate a provider error body.
pub fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [r"AC[a-f0-9]{32}", r"SK[a-f0-9]{32}", r"Basic [A-Za-z0-9+/=]{16,}"] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

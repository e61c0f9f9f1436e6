//! Twilio provider transport using the `/Messages.json` REST API.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{check_http_response, Transport, TransportError};
use crate::message::{Message, SentMessage};

/// Default Twilio REST API base URL.
pub const DEFAULT_TWILIO_URL: &str = "https://api.twilio.com";

/// HTTP request timeout for message creation.
const REQUEST_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Provider API collaborator
// ---------------------------------------------------------------------------

/// Carrier acknowledgement for a single created message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderReceipt {
    /// Provider-assigned message identifier.
    pub sid: String,
    /// Provider-reported status (e.g. `queued`).
    #[serde(default)]
    pub status: Option<String>,
}

/// Carrier API issuing one outbound message per call.
#[async_trait]
pub trait SmsApi: Send + Sync {
    /// Create a message to `to` with the given provider parameters.
    ///
    /// `params` always carries `from` and `body`, plus any configured
    /// provider options.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the provider rejects the call or
    /// cannot be reached.
    async fn create_message(
        &self,
        to: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<ProviderReceipt, TransportError>;
}

/// Twilio REST client authenticated with an account SID and auth token.
pub struct TwilioClient {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    /// Base URL for the Twilio API.
    #[doc(hidden)]
    pub base_url: String,
}

impl TwilioClient {
    /// Create a client for the given account.
    pub fn new(account_sid: String, auth_token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeout, using default");
                reqwest::Client::default()
            });
        Self {
            client,
            account_sid,
            auth_token,
            base_url: DEFAULT_TWILIO_URL.to_owned(),
        }
    }

    /// Point the client at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url.trim_end_matches('/'),
            self.account_sid
        )
    }
}

impl std::fmt::Debug for TwilioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioClient")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl SmsApi for TwilioClient {
    async fn create_message(
        &self,
        to: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<ProviderReceipt, TransportError> {
        let form = build_form(to, params);
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;
        let body = check_http_response(response).await?;
        parse_receipt(&body)
    }
}

// ---------------------------------------------------------------------------
// Request / Response builders (pub for integration testing)
// ---------------------------------------------------------------------------

/// Build the form body for a message-creation call.
///
/// Option keys in `snake_case` or `camelCase` are converted to the API's
/// `PascalCase` parameter names.
#[doc(hidden)]
pub fn build_form(to: &str, params: &BTreeMap<String, String>) -> Vec<(String, String)> {
    let mut form = vec![("To".to_owned(), to.to_owned())];
    form.extend(
        params
            .iter()
            .map(|(key, value)| (api_param_name(key), value.clone())),
    );
    form
}

/// Convert an option key to the Twilio parameter name (`status_callback` -> `StatusCallback`).
#[doc(hidden)]
pub fn api_param_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    let mut upper_next = true;
    for c in key.chars() {
        if c == '_' || c == '-' {
            upper_next = true;
        } else if upper_next {
            name.extend(c.to_uppercase());
            upper_next = false;
        } else {
            name.push(c);
        }
    }
    name
}

/// Parse a message-creation response body.
///
/// # Errors
///
/// Returns [`TransportError::Parse`] if the body is not a message resource.
#[doc(hidden)]
pub fn parse_receipt(body: &str) -> Result<ProviderReceipt, TransportError> {
    serde_json::from_str(body)
        .map_err(|e| TransportError::Parse(format!("invalid message resource: {e}")))
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Delivers messages through an [`SmsApi`], one call per recipient.
///
/// Any failed call aborts the send and is reported as a soft failure for the
/// whole message; partial multi-recipient delivery is not tracked. A message
/// with no sender and no configured `from` fails hard before any call.
pub struct TwilioTransport {
    client: Arc<dyn SmsApi>,
    options: BTreeMap<String, String>,
}

impl TwilioTransport {
    /// Create a transport with provider options.
    ///
    /// The `from` option, if present, is the default sender for messages
    /// that do not set one.
    pub fn new(client: Arc<dyn SmsApi>, options: BTreeMap<String, Value>) -> Self {
        let options = options
            .into_iter()
            .filter_map(|(key, value)| option_string(value).map(|v| (key, v)))
            .collect();
        Self { client, options }
    }

    /// Provider options passed along with every call.
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    /// Default sender configured for this transport.
    pub fn default_from(&self) -> Option<&str> {
        self.options.get("from").map(String::as_str)
    }

    /// Parameters for a single call: options overridden by `from` and `body`.
    #[doc(hidden)]
    pub fn call_params(&self, from: &str, body: &str) -> BTreeMap<String, String> {
        let mut params = self.options.clone();
        params.insert("from".to_owned(), from.to_owned());
        params.insert("body".to_owned(), body.to_owned());
        params
    }
}

fn option_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl Transport for TwilioTransport {
    async fn send(&self, message: &Message) -> Result<Option<SentMessage>, TransportError> {
        let from = match (message.from(), self.default_from()) {
            ("", Some(default)) if !default.is_empty() => default,
            ("", _) => {
                return Err(TransportError::Unavailable("no sender configured".to_owned()));
            }
            (from, _) => from,
        };
        let params = self.call_params(from, message.content());

        for to in message.to() {
            match self.client.create_message(to, &params).await {
                Ok(receipt) => {
                    debug!(recipient = %to, sid = %receipt.sid, "provider accepted message");
                }
                Err(e) => {
                    warn!(recipient = %to, error = %e, "provider rejected message");
                    return Ok(None);
                }
            }
        }

        Ok(Some(SentMessage::new(message.clone())))
    }

    fn name(&self) -> &str {
        "twilio"
    }
}

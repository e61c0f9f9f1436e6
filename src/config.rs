//! Configuration loading.
//!
//! Messengers are declared in `switchboard.toml` (or `$SWITCHBOARD_CONFIG`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

/// Config file used when `$SWITCHBOARD_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "switchboard.toml";

/// Messenger used when the config names none.
pub const DEFAULT_MESSENGER: &str = "twilio";

// ── Top-level config ────────────────────────────────────────────

/// Top-level SMS configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    /// Name of the messenger used when none is requested.
    pub default: String,
    /// Messenger definitions keyed by name.
    pub messengers: BTreeMap<String, MessengerConfig>,
    /// Global sender applied to messengers without their own.
    pub from: Option<String>,
    /// Global recipient applied to messengers without their own.
    pub to: Option<String>,
    /// Channel used by log transports that do not name one.
    pub log_channel: Option<String>,
    /// Service-wide provider settings.
    pub services: ServicesConfig,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            default: DEFAULT_MESSENGER.to_owned(),
            messengers: BTreeMap::new(),
            from: None,
            to: None,
            log_channel: None,
            services: ServicesConfig::default(),
        }
    }
}

impl SmsConfig {
    /// Parse a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: SmsConfig = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Load `path` and apply process environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = load_config(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Definition of the messenger called `name`.
    pub fn messenger(&self, name: &str) -> Option<&MessengerConfig> {
        self.messengers.get(name)
    }

    /// Add or replace a messenger definition.
    #[must_use]
    pub fn with_messenger(mut self, name: impl Into<String>, config: MessengerConfig) -> Self {
        self.messengers.insert(name.into(), config);
        self
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests never touch the process environment.
    /// Empty values are ignored.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = env("SMS_MESSENGER") {
            self.default = v;
        }
        if let Some(v) = env("SMS_FROM_NUMBER") {
            self.from = Some(v);
        }
        if let Some(v) = env("SMS_TO_NUMBER") {
            self.to = Some(v);
        }
        if let Some(v) = env("SMS_LOG_CHANNEL") {
            self.log_channel = Some(v);
        }

        // Twilio credentials.
        if let Some(v) = env("TWILIO_ACCOUNT_SID") {
            self.services
                .twilio
                .insert("account_sid".to_owned(), Value::String(v));
        }
        if let Some(v) = env("TWILIO_AUTH_TOKEN") {
            self.services
                .twilio
                .insert("auth_token".to_owned(), Value::String(v));
        }
    }
}

// ── Services ────────────────────────────────────────────────────

/// Service-wide settings merged under each provider messenger.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Twilio credentials and default options.
    pub twilio: BTreeMap<String, Value>,
}

impl std::fmt::Debug for ServicesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicesConfig")
            .field("twilio", &self.twilio.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ── Messenger entries ───────────────────────────────────────────

/// One `[messengers.<name>]` entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessengerConfig {
    /// Transport kind (`twilio`, `failover`, `log`, `array`, or a registered kind).
    #[serde(default)]
    pub transport: String,
    /// Sender applied to every message from this messenger.
    #[serde(default)]
    pub from: Option<String>,
    /// Recipient applied to every message from this messenger.
    #[serde(default)]
    pub to: Option<String>,
    /// Child messenger names, tried in order by a failover transport.
    #[serde(default)]
    pub messengers: Vec<String>,
    /// Failover retry period in seconds.
    #[serde(default)]
    pub retry_period: Option<u64>,
    /// Log channel for log transports.
    #[serde(default)]
    pub channel: Option<String>,
    /// Remaining keys, passed to the transport as provider options.
    #[serde(flatten)]
    pub options: BTreeMap<String, Value>,
}

impl MessengerConfig {
    /// Entry for the given transport kind.
    pub fn new(transport: impl Into<String>) -> Self {
        Self {
            transport: transport.into(),
            ..Self::default()
        }
    }

    /// Set the messenger sender.
    #[must_use]
    pub fn from(mut self, number: impl Into<String>) -> Self {
        self.from = Some(number.into());
        self
    }

    /// Set the messenger recipient.
    #[must_use]
    pub fn to(mut self, number: impl Into<String>) -> Self {
        self.to = Some(number.into());
        self
    }

    /// Set failover children.
    #[must_use]
    pub fn messengers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.messengers = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the log channel.
    #[must_use]
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Add a provider option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

// ── Loading ─────────────────────────────────────────────────────

/// Load configuration from a TOML file, without env overrides.
pub fn load_config(path: &Path) -> Result<SmsConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    let config: SmsConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config at {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        messengers = config.messengers.len(),
        "loaded sms config"
    );
    Ok(config)
}

/// Resolve the config file path: `$SWITCHBOARD_CONFIG` or `./switchboard.toml`.
pub fn config_path() -> PathBuf {
    config_path_with(|key| std::env::var(key).ok())
}

/// Resolve the config path using a custom env resolver (for testing).
pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    match env("SWITCHBOARD_CONFIG") {
        Some(p) if !p.is_empty() => PathBuf::from(p),
        _ => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}

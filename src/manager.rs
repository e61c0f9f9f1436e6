//! Messenger resolution, caching, and transport construction.
//!
//! [`SmsManager`] turns `[messengers.<name>]` entries into [`Messenger`]s on
//! first use and caches them by name. Transports are built from a closed table
//! of built-in kinds plus caller-registered creators (see
//! [`SmsManager::extend`]).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{MessengerConfig, SmsConfig};
use crate::events::EventDispatcher;
use crate::messenger::{Messenger, SmsError, SmsSender};
use crate::queue::MessageQueue;
use crate::transport::array::ArrayTransport;
use crate::transport::failover::{FailoverTransport, DEFAULT_RETRY_PERIOD};
use crate::transport::log::{LogSink, LogTransport, TracingSink, DEFAULT_LOG_CHANNEL};
use crate::transport::twilio::{TwilioClient, TwilioTransport};
use crate::transport::Transport;

/// Keys removed from merged provider options before they reach the transport.
const PROVIDER_META_KEYS: &[&str] = &["transport", "account_sid", "auth_token", "api_base"];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Configuration errors raised while resolving a messenger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    /// No `[messengers.<name>]` entry exists.
    #[error("sms messenger [{name}] is not defined")]
    MessengerNotDefined {
        /// Requested name.
        name: String,
    },
    /// The transport kind is blank or unknown.
    #[error("unsupported sms transport [{kind}]")]
    UnsupportedTransport {
        /// Offending kind.
        kind: String,
    },
    /// A provider credential is missing.
    #[error("sms messenger [{messenger}] is missing credential '{key}'")]
    MissingCredential {
        /// Messenger being resolved.
        messenger: String,
        /// Missing key.
        key: String,
    },
    /// A failover chain lists itself.
    #[error("failover chain loops back to sms messenger [{name}]")]
    FailoverCycle {
        /// Messenger that was visited twice.
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Resolves named senders; used by queued jobs to find their messenger.
pub trait MessengerFactory: Send + Sync {
    /// Sender for `name`, or the default sender when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SmsError::Manager`] if the messenger cannot be resolved.
    fn sender(&self, name: Option<&str>) -> Result<Arc<dyn SmsSender>, SmsError>;
}

/// Caller-registered transport constructor for a custom kind.
pub type TransportCreator =
    Arc<dyn Fn(&MessengerConfig) -> Result<Arc<dyn Transport>, ManagerError> + Send + Sync>;

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Resolves and caches messengers by name.
pub struct SmsManager {
    config: SmsConfig,
    default_name: RwLock<String>,
    events: Option<Arc<dyn EventDispatcher>>,
    queue: Option<Arc<dyn MessageQueue>>,
    log_sink: Option<Arc<dyn LogSink>>,
    creators: RwLock<HashMap<String, TransportCreator>>,
    messengers: Mutex<HashMap<String, Arc<Messenger>>>,
}

impl SmsManager {
    /// Manager over `config` with no collaborators.
    pub fn new(config: SmsConfig) -> Self {
        Self {
            default_name: RwLock::new(config.default.clone()),
            config,
            events: None,
            queue: None,
            log_sink: None,
            creators: RwLock::new(HashMap::new()),
            messengers: Mutex::new(HashMap::new()),
        }
    }

    /// Give every resolved messenger this event dispatcher.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventDispatcher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Give every resolved messenger this queue.
    #[must_use]
    pub fn with_queue(mut self, queue: Arc<dyn MessageQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Route every log transport to `sink` instead of tracing.
    #[must_use]
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// The configuration this manager resolves from.
    pub fn config(&self) -> &SmsConfig {
        &self.config
    }

    /// Configured messenger names, sorted.
    pub fn messenger_names(&self) -> Vec<String> {
        self.config.messengers.keys().cloned().collect()
    }

    /// Current default messenger name.
    pub fn default_messenger_name(&self) -> String {
        match self.default_name.read() {
            Ok(name) => name.clone(),
            Err(e) => {
                warn!(error = %e, "default messenger lock poisoned");
                e.into_inner().clone()
            }
        }
    }

    /// Change the default messenger name.
    pub fn set_default_messenger(&self, name: impl Into<String>) {
        let mut current = match self.default_name.write() {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "default messenger lock poisoned");
                e.into_inner()
            }
        };
        *current = name.into();
    }

    /// The default messenger.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError`] if it cannot be resolved.
    pub fn default_messenger(&self) -> Result<Arc<Messenger>, ManagerError> {
        self.messenger(None)
    }

    /// Resolve a messenger by name, falling back to the default.
    ///
    /// Repeated calls with the same name return the same instance until it is
    /// purged.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError`] if the name is not configured or its transport
    /// cannot be built.
    pub fn messenger(&self, name: Option<&str>) -> Result<Arc<Messenger>, ManagerError> {
        let name = match name {
            Some(n) if !n.is_empty() => n.to_owned(),
            _ => self.default_messenger_name(),
        };

        // Held across resolution so concurrent first access builds one instance.
        let mut cache = self.cache();
        if let Some(messenger) = cache.get(&name) {
            return Ok(Arc::clone(messenger));
        }

        let messenger = Arc::new(self.resolve(&name)?);
        cache.insert(name, Arc::clone(&messenger));
        Ok(messenger)
    }

    /// Drop a cached messenger so the next lookup rebuilds it.
    pub fn purge(&self, name: Option<&str>) {
        let name = match name {
            Some(n) if !n.is_empty() => n.to_owned(),
            _ => self.default_messenger_name(),
        };
        self.cache().remove(&name);
        debug!(messenger = %name, "sms messenger purged");
    }

    /// Drop every cached messenger.
    pub fn forget_messengers(&self) {
        self.cache().clear();
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Arc<Messenger>>> {
        match self.messengers.lock() {
            Ok(cache) => cache,
            Err(e) => {
                warn!(error = %e, "sms messenger cache lock poisoned");
                e.into_inner()
            }
        }
    }

    /// Register a constructor for a custom transport kind.
    ///
    /// Registered kinds take precedence over built-in ones.
    pub fn extend<F>(&self, kind: impl Into<String>, creator: F) -> &Self
    where
        F: Fn(&MessengerConfig) -> Result<Arc<dyn Transport>, ManagerError> + Send + Sync + 'static,
    {
        let kind = kind.into();
        debug!(kind = %kind, "registered custom sms transport");
        match self.creators.write() {
            Ok(mut creators) => {
                creators.insert(kind, Arc::new(creator));
            }
            Err(e) => {
                warn!(error = %e, "sms transport registry lock poisoned");
                e.into_inner().insert(kind, Arc::new(creator));
            }
        }
        self
    }

    /// Build the transport described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError`] for unknown kinds, missing credentials, or
    /// failover problems.
    pub fn create_transport(
        &self,
        config: &MessengerConfig,
    ) -> Result<Arc<dyn Transport>, ManagerError> {
        self.build_transport("", config, &mut Vec::new())
    }

    fn resolve(&self, name: &str) -> Result<Messenger, ManagerError> {
        let config = self
            .config
            .messenger(name)
            .ok_or_else(|| ManagerError::MessengerNotDefined {
                name: name.to_owned(),
            })?;

        let transport = self.build_transport(name, config, &mut Vec::new())?;
        let mut messenger = Messenger::new(name, transport);

        if let Some(events) = &self.events {
            messenger = messenger.with_events(Arc::clone(events));
        }
        if let Some(queue) = &self.queue {
            messenger = messenger.with_queue(Arc::clone(queue));
        }
        if let Some(from) = config.from.as_ref().or(self.config.from.as_ref()) {
            messenger = messenger.always_from(from.clone());
        }
        if let Some(to) = config.to.as_ref().or(self.config.to.as_ref()) {
            messenger = messenger.always_to(to.clone());
        }

        info!(
            messenger = %name,
            transport = messenger.transport().name(),
            "sms messenger resolved"
        );
        Ok(messenger)
    }

    fn build_transport(
        &self,
        name: &str,
        config: &MessengerConfig,
        chain: &mut Vec<String>,
    ) -> Result<Arc<dyn Transport>, ManagerError> {
        let creator = match self.creators.read() {
            Ok(creators) => creators.get(&config.transport).cloned(),
            Err(e) => {
                warn!(error = %e, "sms transport registry lock poisoned");
                e.into_inner().get(&config.transport).cloned()
            }
        };
        if let Some(creator) = creator {
            return creator(config);
        }

        match config.transport.as_str() {
            "twilio" => self.create_twilio_transport(name, config),
            "failover" => self.create_failover_transport(name, config, chain),
            "log" => Ok(self.create_log_transport(config)),
            "array" => Ok(Arc::new(ArrayTransport::new())),
            kind => Err(ManagerError::UnsupportedTransport {
                kind: kind.to_owned(),
            }),
        }
    }

    fn create_twilio_transport(
        &self,
        name: &str,
        config: &MessengerConfig,
    ) -> Result<Arc<dyn Transport>, ManagerError> {
        let mut options = self.provider_options(config);

        let credential = |key: &str| match options.get(key) {
            Some(Value::String(v)) if !v.is_empty() => Ok(v.clone()),
            _ => Err(ManagerError::MissingCredential {
                messenger: name.to_owned(),
                key: key.to_owned(),
            }),
        };
        let account_sid = credential("account_sid")?;
        let auth_token = credential("auth_token")?;

        let mut client = TwilioClient::new(account_sid, auth_token);
        if let Some(Value::String(base)) = options.get("api_base") {
            client = client.with_base_url(base.clone());
        }

        strip_meta_keys(&mut options);
        Ok(Arc::new(TwilioTransport::new(Arc::new(client), options)))
    }

    /// Service-wide defaults overridden by the messenger's own options.
    fn provider_options(&self, config: &MessengerConfig) -> BTreeMap<String, Value> {
        let mut options = self.config.services.twilio.clone();
        options.extend(config.options.clone());
        if let Some(from) = &config.from {
            options.insert("from".to_owned(), Value::String(from.clone()));
        }
        options
    }

    fn create_failover_transport(
        &self,
        name: &str,
        config: &MessengerConfig,
        chain: &mut Vec<String>,
    ) -> Result<Arc<dyn Transport>, ManagerError> {
        if !name.is_empty() {
            chain.push(name.to_owned());
        }

        let mut transports = Vec::with_capacity(config.messengers.len());
        for child in &config.messengers {
            if chain.iter().any(|visited| visited == child) {
                return Err(ManagerError::FailoverCycle {
                    name: child.clone(),
                });
            }
            let child_config =
                self.config
                    .messenger(child)
                    .ok_or_else(|| ManagerError::MessengerNotDefined {
                        name: child.clone(),
                    })?;
            transports.push(self.build_transport(child, child_config, chain)?);
        }

        if !name.is_empty() {
            chain.pop();
        }

        let retry_period = config
            .retry_period
            .map_or(DEFAULT_RETRY_PERIOD, Duration::from_secs);
        Ok(Arc::new(FailoverTransport::with_retry_period(
            transports,
            retry_period,
        )))
    }

    fn create_log_transport(&self, config: &MessengerConfig) -> Arc<dyn Transport> {
        let sink: Arc<dyn LogSink> = match &self.log_sink {
            Some(sink) => Arc::clone(sink),
            None => {
                let channel = config
                    .channel
                    .as_deref()
                    .or(self.config.log_channel.as_deref())
                    .unwrap_or(DEFAULT_LOG_CHANNEL);
                Arc::new(TracingSink::new(channel))
            }
        };
        Arc::new(LogTransport::new(sink))
    }
}

fn strip_meta_keys(options: &mut BTreeMap<String, Value>) {
    for key in PROVIDER_META_KEYS {
        options.remove(*key);
    }
}

impl MessengerFactory for SmsManager {
    fn sender(&self, name: Option<&str>) -> Result<Arc<dyn SmsSender>, SmsError> {
        let messenger: Arc<dyn SmsSender> = self.messenger(name)?;
        Ok(messenger)
    }
}

impl std::fmt::Debug for SmsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self.cache().len();
        f.debug_struct("SmsManager")
            .field("default", &self.default_messenger_name())
            .field("messengers", &self.messenger_names())
            .field("cached", &cached)
            .finish()
    }
}

//! Log transport: renders messages into a log sink instead of delivering them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Transport, TransportError};
use crate::message::{Message, SentMessage};

/// Destination for rendered messages.
pub trait LogSink: Send + Sync {
    /// Record a message at debug severity.
    fn debug(&self, message: &dyn fmt::Display);
}

/// [`LogSink`] backed by `tracing`, tagging each record with a channel name.
#[derive(Debug, Clone)]
pub struct TracingSink {
    channel: String,
}

/// Channel used when neither the messenger nor the global config names one.
pub const DEFAULT_LOG_CHANNEL: &str = "sms";

impl TracingSink {
    /// Create a sink for the given channel.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    /// Channel name attached to every record.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CHANNEL)
    }
}

impl LogSink for TracingSink {
    fn debug(&self, message: &dyn fmt::Display) {
        debug!(channel = %self.channel, "{message}");
    }
}

/// Writes each message to a [`LogSink`]. Logging always counts as delivery.
#[derive(Clone)]
pub struct LogTransport {
    sink: Arc<dyn LogSink>,
}

impl LogTransport {
    /// Create a log transport writing to `sink`.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, message: &Message) -> Result<Option<SentMessage>, TransportError> {
        self.sink.debug(message);
        Ok(Some(SentMessage::new(message.clone())))
    }

    fn name(&self) -> &str {
        "log"
    }
}

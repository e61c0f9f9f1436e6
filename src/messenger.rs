//! Named senders bound to a transport.
//!
//! A [`Messenger`] builds the [`Message`], applies its global address
//! overrides, asks the event dispatcher whether the send may proceed, and
//! hands the message to its transport. [`SmsSender`] is the contract shared
//! with test doubles such as [`crate::testing::SmsFake`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::events::{EventDispatcher, SmsEvent};
use crate::manager::ManagerError;
use crate::message::{Message, Recipients, SentMessage};
use crate::pending::{Outgoing, PendingSms};
use crate::queue::{Delay, JobHandle, MessageQueue, QueueError};
use crate::smsable::{Smsable, Via};
use crate::transport::{Transport, TransportError};

/// Callback that configures a freshly created [`Message`] before sending.
pub type MessageCallback = Box<dyn FnOnce(&mut Message) + Send>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by send, queue, and resolution operations.
#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    /// Messenger resolution failed.
    #[error(transparent)]
    Manager(#[from] ManagerError),
    /// The transport failed hard.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The queue refused a job.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// Queueing was requested on a messenger without a queue.
    #[error("messenger '{messenger}' has no queue configured")]
    QueueUnavailable {
        /// Messenger name.
        messenger: String,
    },
    /// A queued job exceeded its time limit.
    #[error("queued job '{job}' timed out after {after:?}")]
    TimedOut {
        /// Job display name.
        job: String,
        /// Limit that was exceeded.
        after: Duration,
    },
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Operations available on anything that sends messages.
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Start a recipient builder bound to this sender.
    fn to(&self, recipients: Recipients) -> PendingSms<'_>;

    /// Send plain text, letting `callback` configure the message first.
    ///
    /// Returns `Ok(None)` when the send was vetoed or the transport declined.
    ///
    /// # Errors
    ///
    /// Returns [`SmsError`] on hard transport failure.
    async fn send_text(
        &self,
        content: String,
        callback: Option<MessageCallback>,
    ) -> Result<Option<SentMessage>, SmsError>;

    /// Send a structured message, or queue it if it asks to be queued.
    ///
    /// # Errors
    ///
    /// Returns [`SmsError`] on resolution, queue, or hard transport failure.
    async fn send_smsable(&self, sms: Box<dyn Smsable>) -> Result<Option<SentMessage>, SmsError>;

    /// Queue a structured message, optionally pinning the queue name.
    ///
    /// # Errors
    ///
    /// Returns [`SmsError`] if no queue is available or it refuses the job.
    fn queue(&self, sms: Box<dyn Smsable>, queue: Option<&str>) -> Result<JobHandle, SmsError>;

    /// Queue a structured message to run after `delay`.
    ///
    /// # Errors
    ///
    /// Returns [`SmsError`] if no queue is available or it refuses the job.
    fn later(
        &self,
        delay: Delay,
        sms: Box<dyn Smsable>,
        queue: Option<&str>,
    ) -> Result<JobHandle, SmsError>;

    /// Send text or a structured message.
    ///
    /// # Errors
    ///
    /// Returns [`SmsError`] as [`SmsSender::send_text`] or
    /// [`SmsSender::send_smsable`] would.
    async fn send(&self, sms: Outgoing) -> Result<Option<SentMessage>, SmsError> {
        match sms {
            Outgoing::Text(content) => self.send_text(content, None).await,
            Outgoing::Smsable(sms) => self.send_smsable(sms).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Messenger
// ---------------------------------------------------------------------------

/// A named sender bound to exactly one transport.
pub struct Messenger {
    name: String,
    transport: Arc<dyn Transport>,
    events: Option<Arc<dyn EventDispatcher>>,
    queue: Option<Arc<dyn MessageQueue>>,
    from: Option<String>,
    to: Option<String>,
}

impl Messenger {
    /// Create a messenger with no hooks, queue, or global addresses.
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            transport,
            events: None,
            queue: None,
            from: None,
            to: None,
        }
    }

    /// Raise send events through `events`.
    pub fn with_events(mut self, events: Arc<dyn EventDispatcher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Defer queued messages onto `queue`.
    pub fn with_queue(mut self, queue: Arc<dyn MessageQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Send every message from `number`, whatever the caller set.
    pub fn always_from(mut self, number: impl Into<String>) -> Self {
        self.from = Some(number.into());
        self
    }

    /// Send every message to `number` only, whatever the caller set.
    pub fn always_to(mut self, number: impl Into<String>) -> Self {
        self.to = Some(number.into());
        self
    }

    /// Messenger name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The transport messages are handed to.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Global sender override.
    pub fn global_from(&self) -> Option<&str> {
        self.from.as_deref()
    }

    /// Global recipient override.
    pub fn global_to(&self) -> Option<&str> {
        self.to.as_deref()
    }

    fn should_send(&self, message: &Message) -> bool {
        match &self.events {
            Some(events) => events.until(&SmsEvent::Sending(message)),
            None => true,
        }
    }

    fn dispatch_sent(&self, sent: &SentMessage) {
        if let Some(events) = &self.events {
            events.dispatch(&SmsEvent::Sent(sent));
        }
    }

    fn queue_handle(&self) -> Result<&dyn MessageQueue, SmsError> {
        self.queue.as_deref().ok_or_else(|| SmsError::QueueUnavailable {
            messenger: self.name.clone(),
        })
    }
}

#[async_trait]
impl SmsSender for Messenger {
    fn to(&self, recipients: Recipients) -> PendingSms<'_> {
        PendingSms::new(self).to(recipients)
    }

    async fn send_text(
        &self,
        content: String,
        callback: Option<MessageCallback>,
    ) -> Result<Option<SentMessage>, SmsError> {
        let mut message = Message::new();
        if let Some(callback) = callback {
            callback(&mut message);
        }
        message.set_content(content);

        if let Some(to) = &self.to {
            message.set_to(to);
        }
        if let Some(from) = &self.from {
            message.set_from(from.as_str());
        }

        if !self.should_send(&message) {
            debug!(messenger = %self.name, "send vetoed by listener");
            return Ok(None);
        }

        match self.transport.send(&message).await? {
            Some(sent) => {
                trace!(messenger = %self.name, transport = self.transport.name(), "message sent");
                self.dispatch_sent(&sent);
                Ok(Some(sent))
            }
            None => {
                debug!(messenger = %self.name, transport = self.transport.name(), "transport declined message");
                Ok(None)
            }
        }
    }

    async fn send_smsable(
        &self,
        mut sms: Box<dyn Smsable>,
    ) -> Result<Option<SentMessage>, SmsError> {
        sms.messenger(Some(self.name.clone()));

        if sms.should_queue() {
            let queue = self.queue_handle()?;
            let job = sms.queue(queue)?;
            debug!(messenger = %self.name, job_id = %job.id, "structured message queued");
            return Ok(None);
        }

        sms.send(Via::Sender(self)).await
    }

    fn queue(&self, mut sms: Box<dyn Smsable>, queue: Option<&str>) -> Result<JobHandle, SmsError> {
        if let Some(name) = queue {
            sms.envelope_mut().queue = Some(name.to_owned());
        }
        sms.messenger(Some(self.name.clone()));
        let handle = self.queue_handle()?;
        Ok(sms.queue(handle)?)
    }

    fn later(
        &self,
        delay: Delay,
        mut sms: Box<dyn Smsable>,
        queue: Option<&str>,
    ) -> Result<JobHandle, SmsError> {
        if let Some(name) = queue {
            sms.envelope_mut().queue = Some(name.to_owned());
        }
        sms.messenger(Some(self.name.clone()));
        let handle = self.queue_handle()?;
        Ok(sms.later(delay, handle)?)
    }
}

impl std::fmt::Debug for Messenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("name", &self.name)
            .field("transport", &self.transport.name())
            .field("events", &self.events.is_some())
            .field("queue", &self.queue.is_some())
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

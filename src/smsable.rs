//! Structured messages: application-defined types that address and build
//! themselves.
//!
//! Implement [`Smsable`] by exposing an [`Envelope`]; every other method has a
//! default. Job tuning (`tries`, `backoff`, ...) is a set of optional methods
//! rather than ad-hoc fields.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::manager::MessengerFactory;
use crate::message::{Message, Recipients, SentMessage};
use crate::messenger::{MessageCallback, SmsError, SmsSender};
use crate::queue::{Delay, JobHandle, MessageQueue, QueueError};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Addressing, content, and routing data carried by a structured message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Sender address; empty means the messenger default.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Text body.
    pub content: String,
    /// Messenger that should deliver this message; `None` means the default.
    pub messenger: Option<String>,
    /// Queue to push onto when deferred.
    pub queue: Option<String>,
    /// Delay applied whenever the message is queued.
    pub delay: Option<Delay>,
}

impl Envelope {
    /// Envelope with the given body and nothing else set.
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Set the sender.
    pub fn from(mut self, number: impl Into<String>) -> Self {
        self.from = number.into();
        self
    }

    /// Replace the recipients.
    pub fn to(mut self, recipients: impl Into<Recipients>) -> Self {
        self.to = recipients.into().into_vec();
        self
    }

    /// Pin a queue name.
    pub fn on_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Always defer by `delay` when queued.
    pub fn delay(mut self, delay: impl Into<Delay>) -> Self {
        self.delay = Some(delay.into());
        self
    }

    /// Whether `number` is the sender.
    pub fn is_from(&self, number: &str) -> bool {
        self.from == number
    }

    /// Whether every given number is among the recipients.
    pub fn has_to(&self, numbers: impl Into<Recipients>) -> bool {
        numbers
            .into()
            .as_slice()
            .iter()
            .all(|number| self.to.contains(number))
    }

    /// Whether the body contains `text`.
    pub fn contains_text(&self, text: &str) -> bool {
        self.content.contains(text)
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// What a structured message is sent through.
#[derive(Clone, Copy)]
pub enum Via<'a> {
    /// Resolve the message's own messenger name through a factory.
    Factory(&'a dyn MessengerFactory),
    /// Send through this sender directly.
    Sender(&'a dyn SmsSender),
}

/// A message type that knows how to build and address itself.
#[async_trait]
pub trait Smsable: Send + Sync + fmt::Debug {
    /// The message data.
    fn envelope(&self) -> &Envelope;

    /// Mutable access to the message data.
    fn envelope_mut(&mut self) -> &mut Envelope;

    /// Populate the envelope before it is addressed and sent.
    fn build(&mut self) {}

    /// Whether sending should defer onto the messenger's queue.
    fn should_queue(&self) -> bool {
        false
    }

    /// Maximum delivery attempts when queued.
    fn tries(&self) -> Option<u32> {
        None
    }

    /// Per-attempt time limit when queued.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Pause between queued attempts.
    fn backoff(&self) -> Option<Duration> {
        None
    }

    /// Give up retrying after this moment.
    fn retry_until(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Called once a queued delivery has failed for good.
    fn failed(&self, _error: &SmsError) {}

    /// Name used in logs and test assertions.
    fn display_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Replace the recipients.
    fn to(&mut self, recipients: Vec<String>) {
        self.envelope_mut().to = recipients;
    }

    /// Choose the messenger that delivers this message.
    fn messenger(&mut self, name: Option<String>) {
        self.envelope_mut().messenger = name;
    }

    /// Build, address, and send the message.
    ///
    /// # Errors
    ///
    /// Returns [`SmsError`] if the messenger cannot be resolved or the
    /// transport fails hard.
    async fn send(&mut self, via: Via<'_>) -> Result<Option<SentMessage>, SmsError> {
        self.build();
        let Envelope {
            from,
            to,
            content,
            messenger,
            ..
        } = self.envelope().clone();

        let callback: MessageCallback = Box::new(move |message: &mut Message| {
            message.set_from(from).set_to(to);
        });

        match via {
            Via::Factory(factory) => {
                let sender = factory.sender(messenger.as_deref())?;
                sender.send_text(content, Some(callback)).await
            }
            Via::Sender(sender) => sender.send_text(content, Some(callback)).await,
        }
    }
}

impl dyn Smsable {
    /// Push onto `queue`, honouring the envelope's queue name and delay.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the queue refuses the job.
    pub fn queue(self: Box<Self>, queue: &dyn MessageQueue) -> Result<JobHandle, QueueError> {
        if let Some(delay) = self.envelope().delay {
            return self.later(delay, queue);
        }
        let name = self.envelope().queue.clone();
        queue.push(SendQueuedSms::new(self), name.as_deref())
    }

    /// Push onto `queue` to run after `delay`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the queue refuses the job.
    pub fn later(
        self: Box<Self>,
        delay: Delay,
        queue: &dyn MessageQueue,
    ) -> Result<JobHandle, QueueError> {
        let name = self.envelope().queue.clone();
        queue.push_later(delay, SendQueuedSms::new(self), name.as_deref())
    }
}

// ---------------------------------------------------------------------------
// PlainSms
// ---------------------------------------------------------------------------

/// The stock structured message: an envelope and nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlainSms {
    envelope: Envelope,
}

impl PlainSms {
    /// Message with the given body.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            envelope: Envelope::with_content(content),
        }
    }

    /// Message from a prepared envelope.
    pub fn from_envelope(envelope: Envelope) -> Self {
        Self { envelope }
    }
}

impl Smsable for PlainSms {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }
}

// ---------------------------------------------------------------------------
// Queued job
// ---------------------------------------------------------------------------

/// Job wrapping a structured message for deferred delivery.
///
/// Job options are read from the message once, when the job is created.
pub struct SendQueuedSms {
    sms: Box<dyn Smsable>,
    tries: Option<u32>,
    timeout: Option<Duration>,
    backoff: Option<Duration>,
    retry_until: Option<DateTime<Utc>>,
    display_name: String,
}

impl SendQueuedSms {
    /// Wrap a message.
    pub fn new(sms: Box<dyn Smsable>) -> Self {
        Self {
            tries: sms.tries(),
            timeout: sms.timeout(),
            backoff: sms.backoff(),
            retry_until: sms.retry_until(),
            display_name: sms.display_name().to_owned(),
            sms,
        }
    }

    /// Send the wrapped message, resolving its messenger through `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`SmsError`] on resolution or hard transport failure.
    pub async fn handle(
        &mut self,
        factory: &dyn MessengerFactory,
    ) -> Result<Option<SentMessage>, SmsError> {
        self.sms.send(Via::Factory(factory)).await
    }

    /// Forward a terminal failure to the message.
    pub fn failed(&self, error: &SmsError) {
        self.sms.failed(error);
    }

    /// Maximum attempts.
    pub fn tries(&self) -> Option<u32> {
        self.tries
    }

    /// Per-attempt time limit.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Pause between attempts.
    pub fn backoff(&self) -> Option<Duration> {
        self.backoff
    }

    /// Retry deadline.
    pub fn retry_until(&self) -> Option<DateTime<Utc>> {
        self.retry_until
    }

    /// Name of the wrapped message type.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl fmt::Debug for SendQueuedSms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendQueuedSms")
            .field("sms", &self.sms)
            .field("tries", &self.tries)
            .field("timeout", &self.timeout)
            .field("backoff", &self.backoff)
            .field("retry_until", &self.retry_until)
            .finish()
    }
}

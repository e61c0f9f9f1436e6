//! Recipient builder returned by [`SmsSender::to`].

use crate::message::{Recipients, SentMessage};
use crate::messenger::{SmsError, SmsSender};
use crate::queue::{Delay, JobHandle};
use crate::smsable::{PlainSms, Smsable};

/// Something that can be sent: literal text or a structured message.
#[derive(Debug)]
pub enum Outgoing {
    /// Literal text body.
    Text(String),
    /// Application-defined structured message.
    Smsable(Box<dyn Smsable>),
}

impl Outgoing {
    /// Wrap a structured message.
    pub fn smsable(sms: impl Smsable + 'static) -> Self {
        Self::Smsable(Box::new(sms))
    }

    fn into_smsable(self) -> Box<dyn Smsable> {
        match self {
            Self::Text(content) => Box::new(PlainSms::new(content)),
            Self::Smsable(sms) => sms,
        }
    }
}

impl From<&str> for Outgoing {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Outgoing {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Box<dyn Smsable>> for Outgoing {
    fn from(value: Box<dyn Smsable>) -> Self {
        Self::Smsable(value)
    }
}

impl From<PlainSms> for Outgoing {
    fn from(value: PlainSms) -> Self {
        Self::smsable(value)
    }
}

/// A recipient list waiting for a body.
///
/// The builder's recipients always replace whatever the message itself set.
pub struct PendingSms<'a> {
    sender: &'a dyn SmsSender,
    to: Vec<String>,
}

impl<'a> PendingSms<'a> {
    /// Builder bound to `sender` with no recipients.
    pub fn new(sender: &'a dyn SmsSender) -> Self {
        Self {
            sender,
            to: Vec::new(),
        }
    }

    /// Replace the recipient list.
    #[must_use]
    pub fn to(mut self, recipients: impl Into<Recipients>) -> Self {
        self.to = recipients.into().into_vec();
        self
    }

    /// Current recipients.
    pub fn recipients(&self) -> &[String] {
        &self.to
    }

    /// Address and send.
    ///
    /// # Errors
    ///
    /// Returns [`SmsError`] as [`SmsSender::send_smsable`] would.
    pub async fn send(&self, sms: impl Into<Outgoing>) -> Result<Option<SentMessage>, SmsError> {
        let sms = self.fill(sms.into());
        self.sender.send_smsable(sms).await
    }

    /// Address and queue.
    ///
    /// # Errors
    ///
    /// Returns [`SmsError`] as [`SmsSender::queue`] would.
    pub fn queue(&self, sms: impl Into<Outgoing>) -> Result<JobHandle, SmsError> {
        self.sender.queue(self.fill(sms.into()), None)
    }

    /// Address and queue to run after `delay`.
    ///
    /// # Errors
    ///
    /// Returns [`SmsError`] as [`SmsSender::later`] would.
    pub fn later(
        &self,
        delay: impl Into<Delay>,
        sms: impl Into<Outgoing>,
    ) -> Result<JobHandle, SmsError> {
        self.sender.later(delay.into(), self.fill(sms.into()), None)
    }

    fn fill(&self, sms: Outgoing) -> Box<dyn Smsable> {
        let mut sms = sms.into_smsable();
        sms.to(self.to.clone());
        sms
    }
}

impl std::fmt::Debug for PendingSms<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSms").field("to", &self.to).finish()
    }
}

//! In-memory stand-in for a manager and its messengers.
//!
//! [`SmsFake`] satisfies [`SmsSender`] and [`MessengerFactory`], so code under
//! test can be handed a fake wherever it expects either. Nothing is delivered:
//! every outgoing message is recorded into one of two ordered sequences,
//! `sent` and `queued`, which tests inspect with the query methods.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::warn;

use crate::manager::MessengerFactory;
use crate::message::{Message, Recipients, SentMessage};
use crate::messenger::{MessageCallback, SmsError, SmsSender};
use crate::pending::PendingSms;
use crate::queue::{Delay, JobHandle};
use crate::smsable::{Envelope, Smsable};

/// One recorded outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeSms {
    /// Type name of the structured message, or `"text"` for literal sends.
    pub kind: String,
    /// Messenger the message went through, `None` for the default.
    pub messenger: Option<String>,
    /// Addressing and content as they were when recorded.
    pub envelope: Envelope,
    /// Delay requested when queued.
    pub delay: Option<Delay>,
}

impl FakeSms {
    fn record(sms: &dyn Smsable, delay: Option<Delay>) -> Self {
        Self {
            kind: sms.display_name().to_owned(),
            messenger: sms.envelope().messenger.clone(),
            envelope: sms.envelope().clone(),
            delay,
        }
    }

    /// Whether this record is of structured message type `T`.
    pub fn is<T: Smsable>(&self) -> bool {
        self.kind == std::any::type_name::<T>()
    }
}

#[derive(Debug, Default)]
struct FakeState {
    sent: Vec<FakeSms>,
    queued: Vec<FakeSms>,
}

/// Recording test double for messengers and the manager.
///
/// Clones share recorded history. [`SmsFake::messenger`] and
/// [`MessengerFactory::sender`] return a clone bound to a messenger name.
#[derive(Debug, Clone, Default)]
pub struct SmsFake {
    state: Arc<Mutex<FakeState>>,
    current: Option<String>,
}

impl SmsFake {
    /// Fake with nothing recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fake sharing this one's history, bound to messenger `name`.
    pub fn messenger(&self, name: Option<&str>) -> Self {
        Self {
            state: Arc::clone(&self.state),
            current: name.map(str::to_owned),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "sms fake state lock poisoned");
                e.into_inner()
            }
        }
    }

    /// Sent messages matching `predicate`, in send order.
    pub fn sent_matching(&self, predicate: impl Fn(&FakeSms) -> bool) -> Vec<FakeSms> {
        self.state()
            .sent
            .iter()
            .filter(|sms| predicate(sms))
            .cloned()
            .collect()
    }

    /// Number of sent messages matching `predicate`.
    pub fn count_sent(&self, predicate: impl Fn(&FakeSms) -> bool) -> usize {
        self.state().sent.iter().filter(|sms| predicate(sms)).count()
    }

    /// Queued messages matching `predicate`, in queue order.
    pub fn queued_matching(&self, predicate: impl Fn(&FakeSms) -> bool) -> Vec<FakeSms> {
        self.state()
            .queued
            .iter()
            .filter(|sms| predicate(sms))
            .cloned()
            .collect()
    }

    /// Number of queued messages matching `predicate`.
    pub fn count_queued(&self, predicate: impl Fn(&FakeSms) -> bool) -> usize {
        self.state()
            .queued
            .iter()
            .filter(|sms| predicate(sms))
            .count()
    }

    /// Every sent message.
    pub fn all_sent(&self) -> Vec<FakeSms> {
        self.state().sent.clone()
    }

    /// Every queued message.
    pub fn all_queued(&self) -> Vec<FakeSms> {
        self.state().queued.clone()
    }

    /// Whether nothing was sent.
    pub fn nothing_sent(&self) -> bool {
        self.state().sent.is_empty()
    }

    /// Whether nothing was queued.
    pub fn nothing_queued(&self) -> bool {
        self.state().queued.is_empty()
    }

    /// Whether nothing was sent or queued.
    pub fn nothing_outgoing(&self) -> bool {
        let state = self.state();
        state.sent.is_empty() && state.queued.is_empty()
    }

    /// Drop the messenger binding; recorded history is kept.
    pub fn forget_messengers(&mut self) {
        self.current = None;
    }

    /// Clear both recorded sequences.
    pub fn clear(&self) {
        let mut state = self.state();
        state.sent.clear();
        state.queued.clear();
    }

    fn record_queued(
        &self,
        mut sms: Box<dyn Smsable>,
        queue: Option<&str>,
        delay: Option<Delay>,
    ) -> JobHandle {
        if let Some(name) = queue {
            sms.envelope_mut().queue = Some(name.to_owned());
        }
        if sms.envelope().messenger.is_none() {
            sms.messenger(self.current.clone());
        }
        let delay = delay.or(sms.envelope().delay);
        let handle = JobHandle::new(sms.envelope().queue.as_deref());
        self.state().queued.push(FakeSms::record(sms.as_ref(), delay));
        handle
    }
}

#[async_trait]
impl SmsSender for SmsFake {
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

        let envelope = Envelope {
            from: message.from().to_owned(),
            to: message.to().to_vec(),
            content: message.content().to_owned(),
            messenger: self.current.clone(),
            ..Envelope::default()
        };
        self.state().sent.push(FakeSms {
            kind: "text".to_owned(),
            messenger: self.current.clone(),
            envelope,
            delay: None,
        });
        Ok(None)
    }

    async fn send_smsable(
        &self,
        mut sms: Box<dyn Smsable>,
    ) -> Result<Option<SentMessage>, SmsError> {
        if sms.envelope().messenger.is_none() {
            sms.messenger(self.current.clone());
        }
        if sms.should_queue() {
            self.record_queued(sms, None, None);
            return Ok(None);
        }
        sms.build();
        self.state().sent.push(FakeSms::record(sms.as_ref(), None));
        Ok(None)
    }

    fn queue(&self, sms: Box<dyn Smsable>, queue: Option<&str>) -> Result<JobHandle, SmsError> {
        Ok(self.record_queued(sms, queue, None))
    }

    fn later(
        &self,
        delay: Delay,
        sms: Box<dyn Smsable>,
        queue: Option<&str>,
    ) -> Result<JobHandle, SmsError> {
        Ok(self.record_queued(sms, queue, Some(delay)))
    }
}

impl MessengerFactory for SmsFake {
    fn sender(&self, name: Option<&str>) -> Result<Arc<dyn SmsSender>, SmsError> {
        Ok(Arc::new(self.messenger(name)))
    }
}

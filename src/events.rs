//! Send lifecycle events and the dispatcher contract used to observe them.
//!
//! A messenger raises [`SmsEvent::Sending`] before handing a message to its
//! transport and [`SmsEvent::Sent`] after a successful delivery. Only the
//! sending event can be vetoed.

use std::sync::{RwLock, RwLockReadGuard};

use tracing::warn;

use crate::message::{Message, SentMessage};

/// Lifecycle event raised by a messenger.
#[derive(Debug, Clone, Copy)]
pub enum SmsEvent<'a> {
    /// A message is about to be handed to the transport.
    Sending(&'a Message),
    /// The transport accepted a message.
    Sent(&'a SentMessage),
}

impl<'a> SmsEvent<'a> {
    /// The message this event concerns.
    pub fn message(&self) -> &'a Message {
        match *self {
            Self::Sending(message) => message,
            Self::Sent(sent) => sent.original_message(),
        }
    }

    /// The delivery record, for sent events.
    pub fn sent(&self) -> Option<&'a SentMessage> {
        match *self {
            Self::Sending(_) => None,
            Self::Sent(sent) => Some(sent),
        }
    }
}

/// A listener's answer to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Let the event reach the remaining listeners.
    Continue,
    /// Stop propagation; for a sending event this cancels the send.
    Veto,
}

/// Event dispatcher collaborator.
pub trait EventDispatcher: Send + Sync {
    /// Dispatch an event until a listener vetoes it.
    ///
    /// Returns `false` if any listener vetoed.
    fn until(&self, event: &SmsEvent<'_>) -> bool;

    /// Dispatch an event to every listener, ignoring vetoes.
    fn dispatch(&self, event: &SmsEvent<'_>);
}

type Listener = Box<dyn Fn(&SmsEvent<'_>) -> Propagation + Send + Sync>;

/// In-process [`EventDispatcher`] calling listeners in registration order.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
}

impl EventBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn listen<F>(&self, listener: F)
    where
        F: Fn(&SmsEvent<'_>) -> Propagation + Send + Sync + 'static,
    {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(Box::new(listener)),
            Err(e) => {
                warn!(error = %e, "sms event listener lock poisoned");
                e.into_inner().push(Box::new(listener));
            }
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    fn listeners(&self) -> RwLockReadGuard<'_, Vec<Listener>> {
        match self.listeners.read() {
            Ok(listeners) => listeners,
            Err(e) => {
                warn!(error = %e, "sms event listener lock poisoned");
                e.into_inner()
            }
        }
    }
}

impl EventDispatcher for EventBus {
    fn until(&self, event: &SmsEvent<'_>) -> bool {
        let listeners = self.listeners();
        !listeners
            .iter()
            .any(|listener| listener(event) == Propagation::Veto)
    }

    fn dispatch(&self, event: &SmsEvent<'_>) {
        let listeners = self.listeners();
        for listener in listeners.iter() {
            let _ = listener(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

//! Switchboard: transport-agnostic outbound SMS dispatch.
//!
//! An [`SmsManager`] resolves named [`Messenger`]s from configuration and
//! caches them. Each messenger owns one [`Transport`] (a carrier API, a
//! failover chain, a log, or an in-memory sink), raises send events, and can
//! defer structured messages onto a [`MessageQueue`].
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;

pub mod events;
pub mod message;
pub mod transport;

pub mod manager;
pub mod messenger;
pub mod pending;

pub mod queue;
pub mod smsable;

pub mod testing;

pub use config::{MessengerConfig, SmsConfig};
pub use events::{EventBus, EventDispatcher, Propagation, SmsEvent};
pub use manager::{ManagerError, MessengerFactory, SmsManager};
pub use message::{Message, Recipients, SentMessage};
pub use messenger::{Messenger, SmsError, SmsSender};
pub use pending::{Outgoing, PendingSms};
pub use queue::{ChannelQueue, Delay, JobHandle, MessageQueue, QueueError, QueueWorker};
pub use smsable::{Envelope, PlainSms, SendQueuedSms, Smsable};
pub use transport::{Transport, TransportError};

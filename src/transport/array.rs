//! In-memory sink transport.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::warn;

use super::{Transport, TransportError};
use crate::message::{Message, SentMessage};

/// Captures every message in memory and never fails.
///
/// Used to observe what would have been sent without network egress. The
/// capture buffer is single-writer in practice; the mutex only keeps the
/// transport `Sync`.
#[derive(Debug, Default)]
pub struct ArrayTransport {
    messages: Mutex<Vec<SentMessage>>,
}

impl ArrayTransport {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every message captured so far, oldest first.
    pub fn messages(&self) -> Vec<SentMessage> {
        self.buffer().clone()
    }

    /// Number of captured messages.
    pub fn len(&self) -> usize {
        self.buffer().len()
    }

    /// Whether nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.buffer().is_empty()
    }

    /// Replace the buffer with an empty one, returning what it held.
    pub fn flush(&self) -> Vec<SentMessage> {
        std::mem::take(&mut *self.buffer())
    }

    fn buffer(&self) -> MutexGuard<'_, Vec<SentMessage>> {
        match self.messages.lock() {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "array transport buffer lock poisoned");
                e.into_inner()
            }
        }
    }
}

#[async_trait]
impl Transport for ArrayTransport {
    async fn send(&self, message: &Message) -> Result<Option<SentMessage>, TransportError> {
        let sent = SentMessage::new(message.clone());
        self.buffer().push(sent.clone());
        Ok(Some(sent))
    }

    fn name(&self) -> &str {
        "array"
    }
}

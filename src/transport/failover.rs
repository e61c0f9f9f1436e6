//! Failover transport trying an ordered chain of backends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Transport, TransportError};
use crate::message::{Message, SentMessage};

/// Retry period used when the configuration does not specify one.
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(60);

/// Tries each child transport in order until one delivers.
///
/// A child that errors is treated as a transient outage and skipped; a child
/// that returns `None` is skipped as well. If no child delivers, the whole
/// send fails with [`TransportError::Exhausted`].
pub struct FailoverTransport {
    transports: Vec<Arc<dyn Transport>>,
    retry_period: Duration,
}

impl FailoverTransport {
    /// Create a chain with the default retry period.
    pub fn new(transports: Vec<Arc<dyn Transport>>) -> Self {
        Self::with_retry_period(transports, DEFAULT_RETRY_PERIOD)
    }

    /// Create a chain with an explicit retry period.
    ///
    /// The period is informational: it is kept for callers that implement a
    /// cool-down policy, but the chain itself never waits.
    pub fn with_retry_period(transports: Vec<Arc<dyn Transport>>, retry_period: Duration) -> Self {
        Self {
            transports,
            retry_period,
        }
    }

    /// Configured retry period.
    pub fn retry_period(&self) -> Duration {
        self.retry_period
    }
}

#[async_trait]
impl Transport for FailoverTransport {
    async fn send(&self, message: &Message) -> Result<Option<SentMessage>, TransportError> {
        for transport in &self.transports {
            match transport.send(message).await {
                Ok(Some(sent)) => return Ok(Some(sent)),
                Ok(None) => {
                    debug!(transport = transport.name(), "transport declined message, trying next");
                }
                Err(e) => {
                    warn!(transport = transport.name(), error = %e, "transport failed, trying next");
                }
            }
        }

        Err(TransportError::Exhausted {
            attempted: self.transports.len(),
        })
    }

    fn name(&self) -> &str {
        "failover"
    }
}

impl std::fmt::Debug for FailoverTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverTransport")
            .field(
                "transports",
                &self.transports.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("retry_period", &self.retry_period)
            .finish()
    }
}

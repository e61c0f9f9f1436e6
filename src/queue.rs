//! Deferred delivery: the queue contract and an in-process channel queue.
//!
//! Structured messages are pushed as [`SendQueuedSms`] jobs. Any job system
//! can back [`MessageQueue`]; [`ChannelQueue`] is a tokio mpsc implementation
//! whose [`QueueWorker`] runs jobs against a [`MessengerFactory`], honouring
//! each job's delay, `tries`, `backoff`, `timeout`, and `retry_until`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::manager::MessengerFactory;
use crate::message::SentMessage;
use crate::messenger::SmsError;
use crate::smsable::SendQueuedSms;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How long to hold a job before running it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    /// Run after a relative duration.
    After(Duration),
    /// Run at an absolute time.
    At(DateTime<Utc>),
}

impl Delay {
    /// Delay of a whole number of seconds.
    pub fn seconds(secs: u64) -> Self {
        Self::After(Duration::from_secs(secs))
    }

    /// Time left to wait as of `now`; zero once the moment has passed.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Self::After(duration) => *duration,
            Self::At(at) => at.signed_duration_since(now).to_std().unwrap_or_default(),
        }
    }
}

impl From<Duration> for Delay {
    fn from(value: Duration) -> Self {
        Self::After(value)
    }
}

impl From<DateTime<Utc>> for Delay {
    fn from(value: DateTime<Utc>) -> Self {
        Self::At(value)
    }
}

/// Opaque receipt for a pushed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Unique job identifier.
    pub id: Uuid,
    /// Queue the job was pushed onto, if one was named.
    pub queue: Option<String>,
}

impl JobHandle {
    /// Create a handle with a fresh identifier.
    pub fn new(queue: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            queue: queue.map(str::to_owned),
        }
    }
}

/// Errors from queue backends.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue no longer accepts jobs.
    #[error("queue is closed")]
    Closed,
    /// The backend refused the job.
    #[error("queue rejected job: {0}")]
    Rejected(String),
}

/// Job queue collaborator.
pub trait MessageQueue: Send + Sync {
    /// Push a job for immediate processing.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the backend does not accept the job.
    fn push(&self, job: SendQueuedSms, queue: Option<&str>) -> Result<JobHandle, QueueError>;

    /// Push a job to run after `delay`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the backend does not accept the job.
    fn push_later(
        &self,
        delay: Delay,
        job: SendQueuedSms,
        queue: Option<&str>,
    ) -> Result<JobHandle, QueueError>;
}

// ---------------------------------------------------------------------------
// Channel queue
// ---------------------------------------------------------------------------

/// A job waiting in a [`ChannelQueue`].
#[derive(Debug)]
pub struct QueuedJob {
    /// Receipt returned to the pusher.
    pub handle: JobHandle,
    /// Delay requested when the job was pushed.
    pub delay: Option<Delay>,
    /// Earliest moment the job may run, fixed when it was pushed.
    pub run_at: Option<Instant>,
    /// The job itself.
    pub job: SendQueuedSms,
}

/// In-process [`MessageQueue`] backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
}

/// Consumer side of a [`ChannelQueue`].
#[derive(Debug)]
pub struct QueueWorker {
    rx: mpsc::UnboundedReceiver<QueuedJob>,
}

/// Create a connected queue and worker pair.
pub fn channel() -> (ChannelQueue, QueueWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelQueue { tx }, QueueWorker { rx })
}

impl ChannelQueue {
    fn enqueue(
        &self,
        delay: Option<Delay>,
        job: SendQueuedSms,
        queue: Option<&str>,
    ) -> Result<JobHandle, QueueError> {
        let handle = JobHandle::new(queue);
        let run_at = delay.map(|delay| {
            let now = Instant::now();
            now.checked_add(delay.remaining(Utc::now())).unwrap_or(now)
        });
        debug!(job_id = %handle.id, job = job.display_name(), "sms job queued");
        self.tx
            .send(QueuedJob {
                handle: handle.clone(),
                delay,
                run_at,
                job,
            })
            .map_err(|_| QueueError::Closed)?;
        Ok(handle)
    }
}

impl MessageQueue for ChannelQueue {
    fn push(&self, job: SendQueuedSms, queue: Option<&str>) -> Result<JobHandle, QueueError> {
        self.enqueue(None, job, queue)
    }

    fn push_later(
        &self,
        delay: Delay,
        job: SendQueuedSms,
        queue: Option<&str>,
    ) -> Result<JobHandle, QueueError> {
        self.enqueue(Some(delay), job, queue)
    }
}

impl QueueWorker {
    /// Process jobs until every [`ChannelQueue`] handle is dropped.
    ///
    /// Each job runs on its own task so delayed jobs do not hold up the rest.
    /// Jobs still waiting or retrying when the queue closes are awaited
    /// before this returns.
    pub async fn run(mut self, factory: Arc<dyn MessengerFactory>) {
        info!("sms queue worker started");
        let mut jobs = JoinSet::new();
        while let Some(queued) = self.rx.recv().await {
            let factory = Arc::clone(&factory);
            jobs.spawn(async move { process(queued, factory.as_ref()).await });
            while let Some(finished) = jobs.try_join_next() {
                reap(finished);
            }
        }
        if !jobs.is_empty() {
            debug!(pending = jobs.len(), "sms queue closed, waiting for running jobs");
        }
        while let Some(finished) = jobs.join_next().await {
            reap(finished);
        }
        info!("sms queue worker stopped");
    }

    /// Receive and run the next job inline.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn run_next(
        &mut self,
        factory: &dyn MessengerFactory,
    ) -> Option<Result<Option<SentMessage>, SmsError>> {
        let queued = self.rx.recv().await?;
        Some(process(queued, factory).await)
    }
}

// Job failures are logged inside `process`; only a crashed task is left.
fn reap(finished: Result<Result<Option<SentMessage>, SmsError>, JoinError>) {
    if let Err(e) = finished {
        warn!(error = %e, "sms job task aborted");
    }
}

async fn process(
    mut queued: QueuedJob,
    factory: &dyn MessengerFactory,
) -> Result<Option<SentMessage>, SmsError> {
    if let Some(run_at) = queued.run_at {
        tokio::time::sleep_until(run_at).await;
    }

    let job = &mut queued.job;
    let max_attempts = job.tries().unwrap_or(1).max(1);
    let mut attempt: u32 = 0;

    loop {
        attempt = attempt.saturating_add(1);
        let result = match job.timeout() {
            Some(limit) => match tokio::time::timeout(limit, job.handle(factory)).await {
                Ok(result) => result,
                Err(_) => Err(SmsError::TimedOut {
                    job: job.display_name().to_owned(),
                    after: limit,
                }),
            },
            None => job.handle(factory).await,
        };

        let error = match result {
            Ok(sent) => {
                debug!(job_id = %queued.handle.id, attempt, delivered = sent.is_some(), "sms job finished");
                return Ok(sent);
            }
            Err(e) => e,
        };

        let expired = job
            .retry_until()
            .is_some_and(|deadline| Utc::now() >= deadline);
        if attempt >= max_attempts || expired {
            warn!(job_id = %queued.handle.id, job = job.display_name(), attempt, error = %error, "sms job failed");
            job.failed(&error);
            return Err(error);
        }

        warn!(job_id = %queued.handle.id, attempt, error = %error, "sms job failed, retrying");
        if let Some(backoff) = job.backoff() {
            tokio::time::sleep(backoff).await;
        }
    }
}

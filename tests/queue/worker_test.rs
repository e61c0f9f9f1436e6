//! Channel queue worker: delays, retries, timeouts, and failure hooks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use switchboard::queue::{self, QueueWorker};
use switchboard::smsable::Envelope;
use switchboard::{
    Delay, Message, MessengerConfig, PlainSms, QueueError, SentMessage, SmsConfig, SmsError,
    SmsManager, SmsSender, Smsable, Transport, TransportError,
};

/// Fails a fixed number of times, then delivers.
#[derive(Default)]
struct Flaky {
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

#[async_trait]
impl Transport for Flaky {
    async fn send(&self, message: &Message) -> Result<Option<SentMessage>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(TransportError::Unavailable("try again".to_owned()));
        }
        Ok(Some(SentMessage::new(message.clone())))
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Takes ten seconds per send.
struct Slow;

#[async_trait]
impl Transport for Slow {
    async fn send(&self, message: &Message) -> Result<Option<SentMessage>, TransportError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(Some(SentMessage::new(message.clone())))
    }

    fn name(&self) -> &str {
        "slow"
    }
}

#[derive(Debug, Default)]
struct Reminder {
    envelope: Envelope,
    queued: bool,
    tries: Option<u32>,
    backoff: Option<Duration>,
    timeout: Option<Duration>,
    retry_until: Option<DateTime<Utc>>,
    failures: Arc<AtomicUsize>,
}

impl Reminder {
    fn for_number(number: &str) -> Self {
        Self {
            envelope: Envelope::default().to(number),
            ..Self::default()
        }
    }
}

impl Smsable for Reminder {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn build(&mut self) {
        self.envelope.content = "Your appointment is tomorrow".to_owned();
    }

    fn should_queue(&self) -> bool {
        self.queued
    }

    fn tries(&self) -> Option<u32> {
        self.tries
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn backoff(&self) -> Option<Duration> {
        self.backoff
    }

    fn retry_until(&self) -> Option<DateTime<Utc>> {
        self.retry_until
    }

    fn failed(&self, _error: &SmsError) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    manager: SmsManager,
    worker: QueueWorker,
    flaky: Arc<Flaky>,
}

/// A manager whose `flaky` and `slow` kinds resolve to the given doubles.
fn manager_for(flaky: &Arc<Flaky>) -> SmsManager {
    let config = SmsConfig::default()
        .with_messenger("flaky", MessengerConfig::new("flaky"))
        .with_messenger("slow", MessengerConfig::new("slow"));
    let manager = SmsManager::new(config);

    let registered = Arc::clone(flaky);
    manager
        .extend("flaky", move |_: &MessengerConfig| {
            let transport: Arc<dyn Transport> = registered.clone();
            Ok(transport)
        })
        .extend("slow", |_: &MessengerConfig| {
            let transport: Arc<dyn Transport> = Arc::new(Slow);
            Ok(transport)
        });
    manager
}

fn harness(failures: usize) -> Harness {
    let (queue, worker) = queue::channel();
    let flaky = Arc::new(Flaky {
        failures_left: AtomicUsize::new(failures),
        attempts: AtomicUsize::new(0),
    });
    let manager = manager_for(&flaky).with_queue(Arc::new(queue));

    Harness {
        manager,
        worker,
        flaky,
    }
}

#[tokio::test]
async fn should_queue_defers_until_the_worker_runs() {
    let mut h = harness(0);
    let messenger = h.manager.messenger(Some("flaky")).expect("resolves");

    let sms = Reminder {
        queued: true,
        ..Reminder::for_number("+1A")
    };
    let immediate = messenger.send_smsable(Box::new(sms)).await.expect("queued");
    assert!(immediate.is_none());
    assert_eq!(h.flaky.attempts.load(Ordering::SeqCst), 0);

    let sent = h
        .worker
        .run_next(&h.manager)
        .await
        .expect("one job")
        .expect("delivered")
        .expect("sent message");
    assert_eq!(sent.original_message().to(), ["+1A"]);
    assert_eq!(
        sent.original_message().content(),
        "Your appointment is tomorrow"
    );
    assert_eq!(h.flaky.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_attempts_are_retried_with_backoff() {
    let mut h = harness(2);
    let messenger = h.manager.messenger(Some("flaky")).expect("resolves");
    let failures = Arc::new(AtomicUsize::new(0));
    let sms = Reminder {
        tries: Some(3),
        backoff: Some(Duration::from_secs(5)),
        failures: Arc::clone(&failures),
        ..Reminder::for_number("+1A")
    };
    messenger.queue(Box::new(sms), None).expect("queued");

    let started = tokio::time::Instant::now();
    let result = h.worker.run_next(&h.manager).await.expect("one job");

    assert!(result.expect("third attempt succeeds").is_some());
    assert_eq!(h.flaky.attempts.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(failures.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn final_failure_calls_the_failed_hook() {
    let mut h = harness(5);
    let messenger = h.manager.messenger(Some("flaky")).expect("resolves");
    let failures = Arc::new(AtomicUsize::new(0));
    let sms = Reminder {
        tries: Some(2),
        failures: Arc::clone(&failures),
        ..Reminder::for_number("+1A")
    };
    messenger.queue(Box::new(sms), None).expect("queued");

    let err = h
        .worker
        .run_next(&h.manager)
        .await
        .expect("one job")
        .expect_err("all attempts fail");
    assert!(matches!(err, SmsError::Transport(TransportError::Unavailable(_))));
    assert_eq!(h.flaky.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retry_deadline_stops_retries() {
    let mut h = harness(5);
    let messenger = h.manager.messenger(Some("flaky")).expect("resolves");
    let sms = Reminder {
        tries: Some(5),
        retry_until: Some(Utc::now() - chrono::Duration::seconds(1)),
        ..Reminder::for_number("+1A")
    };
    messenger.queue(Box::new(sms), None).expect("queued");

    let result = h.worker.run_next(&h.manager).await.expect("one job");
    assert!(result.is_err());
    assert_eq!(h.flaky.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn attempts_are_bounded_by_timeout() {
    let mut h = harness(0);
    let messenger = h.manager.messenger(Some("slow")).expect("resolves");
    let sms = Reminder {
        timeout: Some(Duration::from_secs(1)),
        ..Reminder::for_number("+1A")
    };
    messenger.queue(Box::new(sms), None).expect("queued");

    let err = h
        .worker
        .run_next(&h.manager)
        .await
        .expect("one job")
        .expect_err("times out");
    match err {
        SmsError::TimedOut { job, after } => {
            assert!(job.ends_with("Reminder"));
            assert_eq!(after, Duration::from_secs(1));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn later_waits_out_the_delay() {
    let mut h = harness(0);
    let messenger = h.manager.messenger(Some("flaky")).expect("resolves");
    let handle = messenger
        .to("+1A".into())
        .later(Delay::seconds(30), "see you soon")
        .expect("queued");
    assert!(handle.queue.is_none());

    let started = tokio::time::Instant::now();
    let sent = h
        .worker
        .run_next(&h.manager)
        .await
        .expect("one job")
        .expect("delivered");
    assert!(sent.is_some());
    assert!(started.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn delay_counts_from_the_push_not_the_pickup() {
    let mut h = harness(0);
    let messenger = h.manager.messenger(Some("flaky")).expect("resolves");
    messenger
        .to("+1A".into())
        .later(Delay::seconds(30), "see you soon")
        .expect("queued");

    // The job sits in the channel for the whole delay before a worker looks.
    tokio::time::advance(Duration::from_secs(30)).await;

    let picked_up = tokio::time::Instant::now();
    let sent = h
        .worker
        .run_next(&h.manager)
        .await
        .expect("one job")
        .expect("delivered");
    assert!(sent.is_some());
    assert!(picked_up.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn run_finishes_pending_jobs_after_the_queue_closes() {
    let h = harness(0);
    let messenger = h.manager.messenger(Some("flaky")).expect("resolves");
    messenger
        .to("+1A".into())
        .later(Delay::seconds(30), "see you soon")
        .expect("queued");

    // Dropping every queue handle closes the channel while the job still waits.
    let Harness {
        manager,
        worker,
        flaky,
    } = h;
    drop(messenger);
    drop(manager);

    let factory = Arc::new(manager_for(&flaky));
    let started = tokio::time::Instant::now();
    worker.run(factory).await;

    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn envelope_delay_turns_queue_into_later() {
    let mut h = harness(0);
    let messenger = h.manager.messenger(Some("flaky")).expect("resolves");
    let sms = PlainSms::from_envelope(
        Envelope::with_content("later")
            .to("+1A")
            .delay(Duration::from_secs(45)),
    );
    messenger.queue(Box::new(sms), Some("sms")).expect("queued");

    let started = tokio::time::Instant::now();
    h.worker
        .run_next(&h.manager)
        .await
        .expect("one job")
        .expect("delivered");
    assert!(started.elapsed() >= Duration::from_secs(45));
}

#[test]
fn pinned_queue_name_is_reported_on_the_handle() {
    let h = harness(0);
    let messenger = h.manager.messenger(Some("flaky")).expect("resolves");
    let handle = messenger
        .queue(Box::new(PlainSms::new("hi")), Some("sms"))
        .expect("queued");
    assert_eq!(handle.queue.as_deref(), Some("sms"));
}

#[test]
fn closed_queue_rejects_jobs() {
    let Harness {
        manager, worker, ..
    } = harness(0);
    drop(worker);
    let messenger = manager.messenger(Some("flaky")).expect("resolves");
    let err = messenger
        .queue(Box::new(PlainSms::new("hi")), None)
        .expect_err("closed");
    assert!(matches!(err, SmsError::Queue(QueueError::Closed)));
}

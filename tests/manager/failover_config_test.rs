//! Failover chains assembled from messenger configuration.

use std::sync::Arc;

use async_trait::async_trait;
use switchboard::transport::array::ArrayTransport;
use switchboard::{
    ManagerError, Message, MessengerConfig, SentMessage, SmsConfig, SmsError, SmsManager,
    SmsSender, Transport, TransportError,
};

/// A backend that is always down.
struct Exploding;

#[async_trait]
impl Transport for Exploding {
    async fn send(&self, _message: &Message) -> Result<Option<SentMessage>, TransportError> {
        Err(TransportError::Unavailable("connection refused".to_owned()))
    }

    fn name(&self) -> &str {
        "exploding"
    }
}

fn manager_with(config: SmsConfig) -> (SmsManager, Arc<ArrayTransport>) {
    let manager = SmsManager::new(config);
    let sink = Arc::new(ArrayTransport::new());
    let registered = Arc::clone(&sink);
    manager
        .extend("exploding", |_: &MessengerConfig| {
            let transport: Arc<dyn Transport> = Arc::new(Exploding);
            Ok(transport)
        })
        .extend("shared", move |_: &MessengerConfig| {
            let transport: Arc<dyn Transport> = registered.clone();
            Ok(transport)
        });
    (manager, sink)
}

#[tokio::test]
async fn failover_delivers_through_the_first_healthy_backend() {
    let config = SmsConfig {
        default: "primary".to_owned(),
        ..SmsConfig::default()
    }
    .with_messenger(
        "primary",
        MessengerConfig::new("failover").messengers(["provider_a", "provider_b"]),
    )
    .with_messenger("provider_a", MessengerConfig::new("exploding"))
    .with_messenger("provider_b", MessengerConfig::new("shared"));
    let (manager, sink) = manager_with(config);

    let messenger = manager.messenger(None).expect("resolves");
    assert_eq!(messenger.transport().name(), "failover");

    let sent = messenger
        .to("+15559999".into())
        .send("hello")
        .await
        .expect("no error")
        .expect("delivered");

    assert_eq!(sent.original_message().content(), "hello");
    let recorded = sink.messages();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].original_message().content(), "hello");
    assert_eq!(recorded[0].original_message().to(), ["+15559999"]);
}

#[tokio::test]
async fn exhausted_chain_surfaces_as_an_error() {
    let config = SmsConfig::default()
        .with_messenger(
            "primary",
            MessengerConfig::new("failover").messengers(["down_a", "down_b"]),
        )
        .with_messenger("down_a", MessengerConfig::new("exploding"))
        .with_messenger("down_b", MessengerConfig::new("exploding"));
    let (manager, _sink) = manager_with(config);

    let messenger = manager.messenger(Some("primary")).expect("resolves");
    let err = messenger
        .to("+1A".into())
        .send("hello")
        .await
        .expect_err("must be loud");
    assert!(matches!(
        err,
        SmsError::Transport(TransportError::Exhausted { attempted: 2 })
    ));
}

#[test]
fn self_referencing_chain_is_rejected() {
    let config = SmsConfig::default()
        .with_messenger("a", MessengerConfig::new("failover").messengers(["b"]))
        .with_messenger("b", MessengerConfig::new("failover").messengers(["array", "a"]))
        .with_messenger("array", MessengerConfig::new("array"));
    let manager = SmsManager::new(config);

    assert_eq!(
        manager.messenger(Some("a")).expect_err("cycle"),
        ManagerError::FailoverCycle {
            name: "a".to_owned()
        }
    );
}

#[test]
fn missing_child_is_a_configuration_error() {
    let config = SmsConfig::default().with_messenger(
        "primary",
        MessengerConfig::new("failover").messengers(["ghost"]),
    );
    let manager = SmsManager::new(config);
    assert_eq!(
        manager.messenger(Some("primary")).expect_err("ghost child"),
        ManagerError::MessengerNotDefined {
            name: "ghost".to_owned()
        }
    );
}

#[test]
fn children_may_repeat_without_being_a_cycle() {
    let config = SmsConfig::default()
        .with_messenger(
            "primary",
            MessengerConfig::new("failover").messengers(["array", "array"]),
        )
        .with_messenger("array", MessengerConfig::new("array"));
    let manager = SmsManager::new(config);
    assert!(manager.messenger(Some("primary")).is_ok());
}

//! Messenger resolution, caching, and custom transport kinds.

use std::sync::Arc;
use std::thread;

use switchboard::transport::array::ArrayTransport;
use switchboard::{ManagerError, MessengerConfig, SmsConfig, SmsManager, Transport};

fn config() -> SmsConfig {
    SmsConfig {
        default: "array".to_owned(),
        ..SmsConfig::default()
    }
    .with_messenger("array", MessengerConfig::new("array"))
    .with_messenger("log", MessengerConfig::new("log"))
}

#[test]
fn repeated_lookups_return_the_cached_instance() {
    let manager = SmsManager::new(config());
    let first = manager.messenger(Some("array")).expect("resolves");
    let second = manager.messenger(Some("array")).expect("resolves");
    assert!(Arc::ptr_eq(&first, &second));

    let default = manager.messenger(None).expect("default resolves");
    assert!(Arc::ptr_eq(&first, &default));
}

#[test]
fn purge_forces_a_fresh_instance() {
    let manager = SmsManager::new(config());
    let first = manager.messenger(Some("log")).expect("resolves");
    manager.purge(Some("log"));
    let second = manager.messenger(Some("log")).expect("resolves");
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn purge_without_name_targets_the_default() {
    let manager = SmsManager::new(config());
    let array = manager.messenger(Some("array")).expect("resolves");
    let log = manager.messenger(Some("log")).expect("resolves");

    manager.purge(None);
    assert!(!Arc::ptr_eq(&array, &manager.messenger(Some("array")).expect("resolves")));
    assert!(Arc::ptr_eq(&log, &manager.messenger(Some("log")).expect("resolves")));

    manager.forget_messengers();
    assert!(!Arc::ptr_eq(&log, &manager.messenger(Some("log")).expect("resolves")));
}

#[test]
fn concurrent_first_access_builds_one_instance() {
    let manager = Arc::new(SmsManager::new(config()));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.messenger(Some("array")).expect("resolves"))
        })
        .collect();
    let messengers: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect();
    for messenger in &messengers[1..] {
        assert!(Arc::ptr_eq(&messengers[0], messenger));
    }
}

#[test]
fn unknown_messenger_is_a_configuration_error() {
    let manager = SmsManager::new(config());
    let err = manager.messenger(Some("pager")).expect_err("not configured");
    assert_eq!(
        err,
        ManagerError::MessengerNotDefined {
            name: "pager".to_owned()
        }
    );
    assert_eq!(err.to_string(), "sms messenger [pager] is not defined");
}

#[test]
fn blank_and_unknown_kinds_name_the_offender() {
    let manager = SmsManager::new(
        config()
            .with_messenger("blank", MessengerConfig::new(""))
            .with_messenger("carrier", MessengerConfig::new("pigeon")),
    );

    assert_eq!(
        manager.messenger(Some("blank")).expect_err("blank kind"),
        ManagerError::UnsupportedTransport {
            kind: String::new()
        }
    );
    let err = manager.messenger(Some("carrier")).expect_err("unknown kind");
    assert_eq!(err.to_string(), "unsupported sms transport [pigeon]");
}

#[test]
fn extend_registers_a_custom_kind() {
    let manager = SmsManager::new(
        config().with_messenger("pigeon", MessengerConfig::new("pigeon").option("loft", "north")),
    );
    let shared = Arc::new(ArrayTransport::new());
    let registered = Arc::clone(&shared);
    manager.extend("pigeon", move |config: &MessengerConfig| {
        assert_eq!(config.options.get("loft"), Some(&"north".into()));
        let transport: Arc<dyn Transport> = registered.clone();
        Ok(transport)
    });

    let messenger = manager.messenger(Some("pigeon")).expect("custom kind resolves");
    assert_eq!(messenger.transport().name(), "array");
}

#[test]
fn extend_overrides_a_built_in_kind() {
    let manager = SmsManager::new(config());
    manager.extend("log", |_: &MessengerConfig| {
        let transport: Arc<dyn Transport> = Arc::new(ArrayTransport::new());
        Ok(transport)
    });
    let messenger = manager.messenger(Some("log")).expect("resolves");
    assert_eq!(messenger.transport().name(), "array");
}

#[test]
fn global_addresses_apply_when_messenger_sets_none() {
    let mut config = config().with_messenger(
        "pinned",
        MessengerConfig::new("array").from("+15550001").to("+15550002"),
    );
    config.from = Some("+15559998".to_owned());
    config.to = Some("+15559999".to_owned());
    let manager = SmsManager::new(config);

    let plain = manager.messenger(Some("array")).expect("resolves");
    assert_eq!(plain.global_from(), Some("+15559998"));
    assert_eq!(plain.global_to(), Some("+15559999"));

    let pinned = manager.messenger(Some("pinned")).expect("resolves");
    assert_eq!(pinned.global_from(), Some("+15550001"));
    assert_eq!(pinned.global_to(), Some("+15550002"));
}

#[test]
fn messenger_names_are_sorted() {
    let manager = SmsManager::new(config());
    assert_eq!(manager.messenger_names(), ["array", "log"]);
    assert_eq!(manager.default_messenger_name(), "array");
}

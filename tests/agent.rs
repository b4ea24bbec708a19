use libprehub::network::error::Error as NetworkError;
use libprehub::prehub::registration::REGISTER_RETRY_MS;
use libprehub::prehub::router::REGISTER_TOPIC;
use libprehub::prehub::*;

mod mock;

use mock::MockTransport;

const SNAPSHOT: &str = r#"{"id":"d1","name":"dev","activity":0,"status":0,"labels":[],"deviceConfig":{},"deviceMetadata":{},"payloadMetadata":{}}"#;

fn device() -> Device {
    Device::new("d1", "dev", Activity::Sense).unwrap()
}

fn connected() -> (Agent<MockTransport>, std::rc::Rc<std::cell::RefCell<mock::Log>>) {
    let (transport, log) = MockTransport::new();
    let mut agent = Agent::new(device());
    agent.attach(transport, 0).unwrap();
    (agent, log)
}

fn entries(map: &Metadata) -> Vec<(String, String)> {
    map.iter()
        .map(|(k, v)| (k.as_str().to_string(), v.as_str().to_string()))
        .collect()
}

#[test]
fn attach_subscribes_to_topic_family_and_registers() {
    let (agent, log) = connected();
    let log = log.borrow();

    assert_eq!(
        log.subscribed,
        [
            "prehub/d1/registered",
            "prehub/d1/activate",
            "prehub/d1/deactivate",
            "prehub/d1/payloadmetadata",
            "prehub/d1/devicemetadata",
            "prehub/d1/config",
        ]
    );
    assert_eq!(log.published_on(REGISTER_TOPIC), vec![SNAPSHOT.as_bytes().to_vec()]);
    assert_eq!(agent.registration().state(), RegistrationState::Registering);
    assert_eq!(agent.registration().retry().deadline(), Some(REGISTER_RETRY_MS));
}

#[test]
fn registration_retries_until_activated() {
    let (mut agent, log) = connected();

    agent.tick(REGISTER_RETRY_MS - 1).unwrap();
    assert_eq!(log.borrow().published_on(REGISTER_TOPIC).len(), 1);

    agent.tick(REGISTER_RETRY_MS).unwrap();
    let published = log.borrow().published_on(REGISTER_TOPIC);
    assert_eq!(published.len(), 2);
    assert_eq!(published[0], published[1]);

    log.borrow_mut().deliver("prehub/d1/activate", b"");
    assert_eq!(agent.poll(3_100).unwrap(), Some(Command::Activate));
    assert_eq!(agent.device().status(), Status::Active);
    assert!(agent.is_registered());

    agent.tick(2 * REGISTER_RETRY_MS).unwrap();
    agent.tick(60_000).unwrap();
    assert_eq!(log.borrow().published_on(REGISTER_TOPIC).len(), 2);
}

#[test]
fn retry_keeps_going_without_ack() {
    let (mut agent, log) = connected();
    for i in 1..=5 {
        agent.tick(i * REGISTER_RETRY_MS).unwrap();
    }
    assert_eq!(log.borrow().published_on(REGISTER_TOPIC).len(), 6);
    assert_eq!(agent.registration().attempts(), 6);
}

#[test]
fn register_ack_stops_retries() {
    let (mut agent, log) = connected();
    agent.handle_message("prehub/d1/registerack", b"");
    assert!(agent.is_registered());
    assert_eq!(agent.device().status(), Status::Idle);
    assert!(!agent.registration().retry().is_armed());

    agent.tick(REGISTER_RETRY_MS * 10).unwrap();
    assert_eq!(log.borrow().published_on(REGISTER_TOPIC).len(), 1);
}

#[test]
fn registered_topic_acknowledges_registration() {
    let (mut agent, _log) = connected();
    assert_eq!(
        agent.handle_message("prehub/d1/registered", b""),
        Some(Command::RegisterAck)
    );
    assert_eq!(agent.registration().state(), RegistrationState::Registered);
}

#[test]
fn explicit_register_publishes_once_and_arms_one_retry() {
    let (mut agent, log) = connected();
    agent.register(1_000).unwrap();
    assert_eq!(log.borrow().published_on(REGISTER_TOPIC).len(), 2);
    assert_eq!(
        agent.registration().retry().deadline(),
        Some(1_000 + REGISTER_RETRY_MS)
    );

    // the earlier deadline was replaced, not added to
    agent.tick(REGISTER_RETRY_MS).unwrap();
    assert_eq!(log.borrow().published_on(REGISTER_TOPIC).len(), 2);
    agent.tick(1_000 + REGISTER_RETRY_MS).unwrap();
    assert_eq!(log.borrow().published_on(REGISTER_TOPIC).len(), 3);
}

#[test]
fn register_without_session_is_rejected() {
    let mut agent: Agent<MockTransport> = Agent::new(device());
    assert_eq!(agent.register(0), Err(Error::NotConnected));
    assert_eq!(agent.registration().state(), RegistrationState::Unregistered);
    assert!(!agent.registration().retry().is_armed());
    assert_eq!(agent.poll(0), Err(Error::NotConnected));
}

#[test]
fn disconnect_cancels_pending_retry() {
    let (mut agent, log) = connected();
    agent.disconnect().unwrap();

    {
        let log = log.borrow();
        assert!(log.closed);
        assert_eq!(log.unsubscribed, log.subscribed);
    }
    assert!(!agent.is_connected());
    assert!(!agent.registration().retry().is_armed());

    agent.tick(REGISTER_RETRY_MS * 5).unwrap();
    assert_eq!(log.borrow().published_on(REGISTER_TOPIC).len(), 1);
    assert_eq!(agent.disconnect(), Ok(()));
}

#[test]
fn activate_and_deactivate_are_idempotent() {
    let (mut agent, _log) = connected();

    agent.handle_message("prehub/d1/deactivate", b"");
    assert_eq!(agent.device().status(), Status::Idle);

    agent.handle_message("prehub/d1/activate", b"");
    agent.handle_message("prehub/d1/activate", b"");
    assert_eq!(agent.device().status(), Status::Active);

    agent.handle_message("prehub/d1/deactivate", b"");
    assert_eq!(agent.device().status(), Status::Idle);
    agent.handle_message("prehub/d1/deactivate", b"");
    assert_eq!(agent.device().status(), Status::Idle);

    // activation while already registered keeps the flag set
    assert!(agent.is_registered());
}

#[test]
fn deactivate_does_not_acknowledge_registration() {
    let (mut agent, _log) = connected();
    agent.handle_message("prehub/d1/deactivate", b"");
    assert!(!agent.is_registered());
}

#[test]
fn payload_metadata_overwrites() {
    let (mut agent, log) = connected();
    log.borrow_mut()
        .deliver("prehub/d1/payloadmetadata", br#"{"temp":"21"}"#);
    agent.poll(10).unwrap();
    assert_eq!(
        entries(agent.device().payload_metadata()),
        [("temp".to_string(), "21".to_string())]
    );

    log.borrow_mut()
        .deliver("prehub/d1/payloadmetadata", br#"{"temp":"22"}"#);
    agent.poll(20).unwrap();
    assert_eq!(
        entries(agent.device().payload_metadata()),
        [("temp".to_string(), "22".to_string())]
    );
    assert!(agent.device().device_metadata().is_empty());
}

#[test]
fn device_metadata_and_config_go_to_their_own_maps() {
    let (mut agent, _log) = connected();
    agent.handle_message("prehub/d1/devicemetadata", br#"{"fw":"1.2"}"#);
    agent.handle_message("prehub/d1/config", br#"{"interval":"30"}"#);

    assert_eq!(
        entries(agent.device().device_metadata()),
        [("fw".to_string(), "1.2".to_string())]
    );
    assert_eq!(
        entries(agent.device().config()),
        [("interval".to_string(), "30".to_string())]
    );
    assert!(agent.device().payload_metadata().is_empty());
}

#[test]
fn malformed_metadata_is_dropped() {
    let (mut agent, log) = connected();
    agent.handle_message("prehub/d1/payloadmetadata", br#"{"temp":"21"}"#);

    log.borrow_mut()
        .deliver("prehub/d1/payloadmetadata", b"{not json");
    assert_eq!(
        agent.poll(5).unwrap(),
        Some(Command::Update(MapKind::Payload))
    );
    agent.handle_message("prehub/d1/payloadmetadata", br#"{"temp":21}"#);

    assert_eq!(
        entries(agent.device().payload_metadata()),
        [("temp".to_string(), "21".to_string())]
    );
    assert!(agent.is_connected());
}

#[test]
fn ping_is_answered_with_device_id() {
    let (mut agent, log) = connected();
    assert_eq!(agent.handle_message("prehub/d1/ping", b""), Some(Command::Ping));
    assert_eq!(log.borrow().published_on("d1/pingack"), vec![b"d1".to_vec()]);
}

#[test]
fn ping_without_session_is_contained() {
    let mut agent: Agent<MockTransport> = Agent::new(device());
    assert_eq!(agent.handle_message("prehub/d1/ping", b""), Some(Command::Ping));
}

#[test]
fn foreign_and_unknown_topics_are_ignored() {
    let (mut agent, log) = connected();
    let before = log.borrow().published.len();

    assert_eq!(agent.handle_message("prehub/d2/activate", b""), None);
    assert_eq!(agent.handle_message("prehub/d1/reactivate", b""), None);
    assert_eq!(agent.handle_message("prehub/d1/activate/now", b""), None);

    assert_eq!(agent.device().status(), Status::Idle);
    assert_eq!(log.borrow().published.len(), before);
}

#[test]
fn subscribe_failure_tears_session_down() {
    let (transport, log) = MockTransport::new();
    log.borrow_mut().fail_subscribe_on = Some("/config");
    let mut agent = Agent::new(device());

    assert_eq!(
        agent.attach(transport, 0),
        Err(Error::Network(NetworkError::ConnectionRefused))
    );
    assert!(!agent.is_connected());
    assert!(log.borrow().closed);
    assert!(log.borrow().published.is_empty());
}

#[test]
fn failed_registration_publish_is_retried() {
    let (transport, log) = MockTransport::new();
    log.borrow_mut().fail_publish = true;
    let mut agent = Agent::new(device());

    assert_eq!(
        agent.attach(transport, 0),
        Err(Error::Network(NetworkError::WriteError))
    );
    assert!(agent.is_connected());
    assert!(agent.registration().retry().is_armed());

    log.borrow_mut().fail_publish = false;
    agent.tick(REGISTER_RETRY_MS).unwrap();
    assert_eq!(log.borrow().published_on(REGISTER_TOPIC).len(), 1);
}

#[test]
fn transport_errors_surface_from_poll() {
    let (mut agent, log) = connected();
    log.borrow_mut().fail_poll = Some(NetworkError::ReadError);
    assert_eq!(
        agent.poll(0),
        Err(Error::Network(NetworkError::ReadError))
    );
    assert!(agent.is_connected());
    assert_eq!(agent.poll(0), Ok(None));
}

#[test]
fn keep_alive_pings_quiet_sessions() {
    let (mut agent, log) = connected();
    agent.set_keep_alive(10);
    agent.handle_message("prehub/d1/registerack", b"");

    agent.tick(9_999).unwrap();
    assert_eq!(log.borrow().pings, 0);
    agent.tick(10_000).unwrap();
    assert_eq!(log.borrow().pings, 1);
    agent.tick(15_000).unwrap();
    assert_eq!(log.borrow().pings, 1);
    agent.tick(20_000).unwrap();
    assert_eq!(log.borrow().pings, 2);
}

#[test]
fn snapshot_reflects_current_state() {
    let (transport, log) = MockTransport::new();
    let device = Device::new("d1", "dev", Activity::Display)
        .and_then(|d| d.with_label("lobby"))
        .unwrap();
    let mut agent = Agent::new(device);
    agent.attach(transport, 0).unwrap();
    agent.handle_message("prehub/d1/config", br#"{"mode":"eco"}"#);
    agent.handle_message("prehub/d1/activate", b"");
    agent.register(100).unwrap();

    let published = log.borrow().published_on(REGISTER_TOPIC);
    assert_eq!(
        std::str::from_utf8(&published[1]).unwrap(),
        r#"{"id":"d1","name":"dev","activity":6,"status":1,"labels":["lobby"],"deviceConfig":{"mode":"eco"},"deviceMetadata":{},"payloadMetadata":{}}"#
    );
}

/// A payload with `MAX_ENTRIES` entries whose keys and values are at
/// capacity once unescaped.
fn full_map_payload(tag: char) -> Vec<u8> {
    use libprehub::prehub::device::{MAX_ENTRIES, MAX_KEY_LEN, MAX_VALUE_LEN};

    let value = "\\\"".repeat(MAX_VALUE_LEN);
    let entries: Vec<String> = (0..MAX_ENTRIES)
        .map(|i| format!("\"{}{:0>width$}\":\"{}\"", tag, i, value, width = MAX_KEY_LEN - 1))
        .collect();
    format!("{{{}}}", entries.join(",")).into_bytes()
}

#[test]
fn registration_keeps_retrying_with_full_maps() {
    use libprehub::prehub::device::MAX_ENTRIES;

    let (mut agent, log) = connected();
    agent.handle_message("prehub/d1/payloadmetadata", &full_map_payload('p'));
    agent.handle_message("prehub/d1/devicemetadata", &full_map_payload('d'));
    agent.handle_message("prehub/d1/config", &full_map_payload('c'));
    assert_eq!(agent.device().payload_metadata().len(), MAX_ENTRIES);
    assert_eq!(agent.device().device_metadata().len(), MAX_ENTRIES);
    assert_eq!(agent.device().config().len(), MAX_ENTRIES);

    agent.tick(REGISTER_RETRY_MS).unwrap();
    agent.tick(2 * REGISTER_RETRY_MS).unwrap();
    assert!(agent.registration().retry().is_armed());

    let published = log.borrow().published_on(REGISTER_TOPIC);
    assert_eq!(published.len(), 3);
    assert!(published[2].len() > 3 * MAX_ENTRIES * 128);
}

#[test]
fn ping_acknowledgment_postpones_keep_alive() {
    let (mut agent, log) = connected();
    agent.set_keep_alive(10);
    agent.handle_message("prehub/d1/registerack", b"");

    log.borrow_mut().deliver("prehub/d1/ping", b"");
    assert_eq!(agent.poll(9_000).unwrap(), Some(Command::Ping));

    agent.tick(10_000).unwrap();
    assert_eq!(log.borrow().pings, 0);
    agent.tick(19_000).unwrap();
    assert_eq!(log.borrow().pings, 1);
}

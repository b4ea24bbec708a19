//! Topic naming and inbound message dispatch.
//!
//! Every per-device topic lives under `prehub/<device id>/`. An inbound topic
//! is classified by its final level, which must match one keyword exactly,
//! and by the level before it, which must be this device's id. Exactly one
//! handler runs per message.

use super::device::{Device, MapKind, parse_metadata};
use super::error::Error;
use super::registration::Registration;
use crate::network::pubsub::{MAX_TOPIC_LEN, Transport};
use core::fmt::Write as _;
use heapless::String;

/// Prefix shared by every hub topic.
pub const HUB_PREFIX: &str = "prehub";

/// Topic the registration snapshot is published to.
pub const REGISTER_TOPIC: &str = "prehub/register";

/// Suffixes subscribed under `prehub/<device id>/` once a session is up.
pub const SUBSCRIPTIONS: [&str; 6] = [
    "registered",
    "activate",
    "deactivate",
    "payloadmetadata",
    "devicemetadata",
    "config",
];

/// A topic name.
pub type Topic = String<MAX_TOPIC_LEN>;

/// A hub command, identified from the topic a message arrived on.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Liveness check, answered on `<device id>/pingack`.
    Ping,
    /// Idle → Active. Also counts as a registration acknowledgment.
    Activate,
    /// Active → Idle.
    Deactivate,
    /// Explicit registration acknowledgment (`registerack` or `registered`).
    RegisterAck,
    /// Key/value updates for one of the device maps.
    Update(MapKind),
}

impl Command {
    /// Classify `topic` for the device `device_id`.
    ///
    /// ```rust
    /// use libprehub::prehub::{Command, MapKind};
    ///
    /// assert_eq!(Command::classify("prehub/d1/deactivate", "d1"), Some(Command::Deactivate));
    /// assert_eq!(
    ///     Command::classify("prehub/d1/config", "d1"),
    ///     Some(Command::Update(MapKind::Config))
    /// );
    /// assert_eq!(Command::classify("prehub/d2/activate", "d1"), None);
    /// assert_eq!(Command::classify("prehub/d1/reactivate", "d1"), None);
    /// ```
    pub fn classify(topic: &str, device_id: &str) -> Option<Self> {
        let (parent, keyword) = topic.rsplit_once('/')?;
        let owner = parent.rsplit('/').next()?;
        if owner != device_id {
            return None;
        }

        let command = match keyword {
            "ping" => Command::Ping,
            "activate" => Command::Activate,
            "deactivate" => Command::Deactivate,
            "registerack" | "registered" => Command::RegisterAck,
            "payloadmetadata" => Command::Update(MapKind::Payload),
            "devicemetadata" => Command::Update(MapKind::Device),
            "config" => Command::Update(MapKind::Config),
            _ => return None,
        };
        Some(command)
    }
}

/// `prehub/<device id>/<suffix>`
pub fn device_topic(device_id: &str, suffix: &str) -> Result<Topic, Error> {
    let mut topic = Topic::new();
    write!(topic, "{}/{}/{}", HUB_PREFIX, device_id, suffix).map_err(|_| Error::TopicTooLong)?;
    Ok(topic)
}

/// `<device id>/pingack`
pub fn ping_ack_topic(device_id: &str) -> Result<Topic, Error> {
    let mut topic = Topic::new();
    write!(topic, "{}/pingack", device_id).map_err(|_| Error::TopicTooLong)?;
    Ok(topic)
}

/// Route one inbound message.
///
/// Handler failures (malformed payloads, full maps, a failed ping
/// acknowledgment) are logged and never returned. Commands whose
/// precondition does not hold are ignored, so redelivered messages are
/// harmless. Returns the command the topic was classified as, if any.
pub fn route<T: Transport>(
    topic: &str,
    payload: &[u8],
    device: &mut Device,
    registration: &mut Registration,
    session: Option<&mut T>,
) -> Option<Command> {
    let Some(command) = Command::classify(topic, device.id()) else {
        debug!("ignoring message on {}", topic);
        return None;
    };

    match command {
        Command::Ping => {
            if let Err(err) = acknowledge_ping(device, session) {
                warn!("ping acknowledgment failed: {}", err);
            }
        }
        Command::Activate => {
            if device.activate() {
                info!("activated");
                registration.acknowledge();
            }
        }
        Command::Deactivate => {
            if device.deactivate() {
                info!("deactivated");
            }
        }
        Command::RegisterAck => registration.acknowledge(),
        Command::Update(kind) => match parse_metadata(payload) {
            Ok(updates) => {
                if let Err(err) = device.update(kind, &updates) {
                    warn!("{} update partially applied: {}", kind, err);
                }
            }
            Err(err) => warn!("dropping {} update on {}: {}", kind, topic, err),
        },
    }

    Some(command)
}

fn acknowledge_ping<T: Transport>(device: &Device, session: Option<&mut T>) -> Result<(), Error> {
    let session = session.ok_or(Error::NotConnected)?;
    let topic = ping_ack_topic(device.id())?;
    session.publish(&topic, device.id().as_bytes())?;
    Ok(())
}

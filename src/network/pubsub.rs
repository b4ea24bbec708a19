//! Publish/subscribe capability consumed by the device agent.
//!
//! A [`Transport`] is an established session with a message broker. The agent
//! only ever publishes, subscribes, unsubscribes and polls through this trait,
//! so any broker protocol can sit underneath it. The crate ships an MQTT
//! implementation in [`mqtt`](crate::network::application::mqtt).

use super::error::Error;
use heapless::{String, Vec};

/// Maximum length of a topic name carried by a [`Message`].
pub const MAX_TOPIC_LEN: usize = 256;

/// Maximum size of a [`Message`] payload.
pub const MAX_PAYLOAD_LEN: usize = 1024;

/// An inbound message delivered on a subscribed topic.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Message {
    /// Topic the message was published on.
    pub topic: String<MAX_TOPIC_LEN>,
    /// Raw payload bytes.
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
}

/// A live publish/subscribe session.
///
/// Implementations deliver messages on a single topic in the order the
/// broker sent them.
pub trait Transport {
    /// Publish `payload` on `topic` with at-most-once delivery.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Error>;

    /// Subscribe to `topic`.
    fn subscribe(&mut self, topic: &str) -> Result<(), Error>;

    /// Remove a subscription added with [`subscribe`](Transport::subscribe).
    fn unsubscribe(&mut self, topic: &str) -> Result<(), Error>;

    /// Return the next inbound message, or `None` if nothing is pending.
    fn poll(&mut self) -> Result<Option<Message>, Error>;

    /// Send a keep-alive ping to the broker.
    fn ping(&mut self) -> Result<(), Error>;

    /// End the session and release the underlying connection.
    fn disconnect(self) -> Result<(), Error>;
}

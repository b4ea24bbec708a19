//! MQTT 3.1 / 3.1.1 protocol implementation for embedded systems.
//!
//! MQTT (Message Queuing Telemetry Transport) is a lightweight
//! publish-subscribe messaging protocol ideal for IoT applications:
//! publishers send messages to topics, subscribers receive messages from
//! topics they're interested in, and a broker routes between them.
//!
//! The [`Client`] speaks the subset of the protocol a device agent needs:
//! CONNECT with credentials, PUBLISH, SUBSCRIBE, UNSUBSCRIBE, PINGREQ and
//! DISCONNECT. It implements [`Transport`](crate::network::pubsub::Transport),
//! so it can be handed straight to an [`Agent`](crate::prehub::Agent).
//!
//! ```rust,no_run
//! use libprehub::network::application::mqtt::{Client, Options, QoS};
//! # use libprehub::network::Connection;
//! # struct MockConnection;
//! # impl Connection for MockConnection {}
//! # impl libprehub::network::Read for MockConnection {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl libprehub::network::Write for MockConnection {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl libprehub::network::Close for MockConnection {
//! #     type Error = ();
//! #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//!
//! let connection = MockConnection;
//! let options = Options {
//!     client_id: "iot_device_123",
//!     ..Options::default()
//! };
//!
//! let mut client = Client::connect(connection, &options)?;
//! client.subscribe("prehub/iot_device_123/activate", QoS::AtMostOnce)?;
//! client.publish("prehub/register", b"{}", QoS::AtMostOnce)?;
//!
//! while let Some(message) = client.poll()? {
//!     // message.topic, message.payload
//! #   let _ = message;
//! }
//! client.disconnect()?;
//! # Ok::<(), libprehub::network::error::Error>(())
//! ```

/// MQTT client implementation and supporting types.
pub mod client;

pub use client::{Client, DEFAULT_MAX_IDLE_READS, Options, ProtocolVersion, PublishPacket, QoS};

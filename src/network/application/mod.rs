//! # Application Layer Network Protocols
//!
//! Protocol clients that run over any [`Connection`](crate::network::Connection).
//!
//! - **[`mqtt`]**: MQTT 3.1 / 3.1.1 client, also usable as a
//!   [`Transport`](crate::network::pubsub::Transport) for the device agent
//!
//! Clients follow the same pattern: open a connection with the platform's
//! transport layer, hand it to the client, then use protocol-specific
//! methods.

/// MQTT client implementation.
///
/// Provides an MQTT 3.1.1 client for lightweight publish-subscribe messaging,
/// commonly used in IoT applications.
pub mod mqtt;

//! # libprehub - PreHub device agent
//!
//! A `no_std` library that turns an embedded device into a PreHub spoke: it
//! registers the device with a hub over a publish/subscribe transport,
//! retries until the hub acknowledges, and applies the hub's commands
//! (activate, deactivate, config and metadata pushes) to local device state.
//!
//! ## Layers
//!
//! - **[`network`]**: transport-agnostic `Read`/`Write`/`Close`/`Connect`
//!   traits, the [`Transport`](network::pubsub::Transport) capability and an
//!   MQTT 3.1/3.1.1 client implementing it
//! - **[`prehub`]**: the device model, topic router, registration state
//!   machine and the [`Agent`](prehub::Agent) that ties them to a session
//!
//! ## Usage
//!
//! ```rust,no_run
//! use libprehub::network::application::mqtt::Client;
//! use libprehub::prehub::{Activity, Agent, ConnectOptions, Device};
//! # use libprehub::network::{Close, Connect, Connection, Read, Write};
//! # struct TcpConnection;
//! # impl Connection for TcpConnection {}
//! # impl Read for TcpConnection {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl Write for TcpConnection {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl Close for TcpConnection {
//! #     type Error = ();
//! #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # struct TcpStack;
//! # impl Connect for TcpStack {
//! #     type Connection = TcpConnection;
//! #     type Error = ();
//! #     fn connect(&mut self, _remote: &str, _timeout_ms: u32) -> Result<TcpConnection, ()> {
//! #         Ok(TcpConnection)
//! #     }
//! # }
//! # let mut stack = TcpStack;
//! # let clock = || 0u64;
//!
//! let device = Device::new("thermo-01", "hallway thermometer", Activity::Sense)?
//!     .with_label("indoor")?;
//! let mut agent: Agent<Client<TcpConnection>> = Agent::new(device);
//!
//! let options = ConnectOptions::default().host("hub.local").username("thermo-01");
//! agent.connect(&mut stack, &options, clock())?;
//!
//! loop {
//!     agent.poll(clock())?;
//! }
//! # Ok::<(), libprehub::prehub::Error>(())
//! ```
//!
//! ## Optional Features
//!
//! - `std`: Implement `std::error::Error` for the error types
//! - `defmt`: Enable defmt logging support for embedded debugging

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

#[macro_use]
mod fmt;

/// Network abstraction layer: connection traits, the publish/subscribe
/// capability and the MQTT client.
pub mod network;

/// The PreHub device agent.
pub mod prehub;

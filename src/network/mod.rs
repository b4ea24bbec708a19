//! A network abstraction layer for embedded systems
//!
//! The agent never talks to sockets directly. A platform provides a
//! [`Connect`] implementation that opens byte streams implementing
//! [`Connection`], and the protocol clients under [`application`] speak their
//! wire format over those streams.
//!

#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

/// Publish/subscribe session abstraction
pub mod pubsub;

/// Application layer protocol clients
pub mod application;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connect, Connection, Read, Write};
}

/// Read half of a byte stream.
pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read data from the connection.
    ///
    /// Returns `Ok(0)` when no data is currently available. A stream closed
    /// by the peer is reported as an error, not as `Ok(0)`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Write half of a byte stream.
pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Orderly shutdown of a byte stream.
pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// A synchronous connection
pub trait Connection: Read + Write + Close {}

/// A synchronous connector (client)
pub trait Connect {
    /// Associated connection type
    type Connection: Connection;
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Open a connection to `remote` (`host:port`), giving up after
    /// `timeout_ms` milliseconds.
    fn connect(&mut self, remote: &str, timeout_ms: u32) -> Result<Self::Connection, Self::Error>;
}

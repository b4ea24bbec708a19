//! Errors raised by the device agent.

use crate::network::error::Error as NetworkError;

/// An error raised by the agent, its registration state machine or its
/// message handlers.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The transport failed.
    Network(NetworkError),
    /// The operation needs a live session and there is none.
    NotConnected,
    /// The device snapshot did not fit into the publish buffer.
    Serialize,
    /// A payload was not a flat JSON object of string values.
    Deserialize,
    /// A string or map exceeded its fixed capacity.
    CapacityExceeded,
    /// A topic name could not be built within [`MAX_TOPIC_LEN`](crate::network::pubsub::MAX_TOPIC_LEN).
    TopicTooLong,
}

impl From<NetworkError> for Error {
    fn from(err: NetworkError) -> Self {
        Error::Network(err)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Network(err) => write!(f, "transport error: {}", err),
            Error::NotConnected => f.write_str("no live session"),
            Error::Serialize => f.write_str("device snapshot too large"),
            Error::Deserialize => f.write_str("malformed payload"),
            Error::CapacityExceeded => f.write_str("capacity exceeded"),
            Error::TopicTooLong => f.write_str("topic name too long"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Network(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Network(err) => defmt::write!(f, "Network({})", err),
            Error::NotConnected => defmt::write!(f, "NotConnected"),
            Error::Serialize => defmt::write!(f, "Serialize"),
            Error::Deserialize => defmt::write!(f, "Deserialize"),
            Error::CapacityExceeded => defmt::write!(f, "CapacityExceeded"),
            Error::TopicTooLong => defmt::write!(f, "TopicTooLong"),
        }
    }
}

//! # PreHub device agent
//!
//! A device announces itself to a hub, waits for acknowledgment and then
//! follows the hub's commands:
//!
//! ```text
//!  connect ──▶ subscribe prehub/<id>/{registered,activate,deactivate,
//!                                     payloadmetadata,devicemetadata,config}
//!          ──▶ publish device snapshot on prehub/register
//!              every 3 s until registerack/registered or activate arrives
//!
//!  prehub/<id>/activate         Idle   → Active (also acknowledges registration)
//!  prehub/<id>/deactivate       Active → Idle
//!  prehub/<id>/payloadmetadata  merge into payloadMetadata
//!  prehub/<id>/devicemetadata   merge into deviceMetadata
//!  prehub/<id>/config           merge into deviceConfig
//!  <...>/<id>/ping              reply with the id on <id>/pingack
//! ```
//!
//! [`Agent`] owns the session and drives everything else; [`Device`] holds the
//! state the hub manipulates; [`router`] and [`registration`] hold the
//! message handling and the handshake.

#![deny(unsafe_code)]

/// Session ownership and event loop.
pub mod agent;

/// Device model and metadata merging.
pub mod device;

/// Agent error type.
pub mod error;

/// Connection settings.
pub mod options;

/// Registration handshake and retry timer.
pub mod registration;

/// Topic naming and dispatch.
pub mod router;

pub use agent::Agent;
pub use device::{Activity, Device, MapKind, Metadata, Status, merge};
pub use error::Error;
pub use options::ConnectOptions;
pub use registration::{Registration, RegistrationState, RetryTimer};
pub use router::Command;

//! Registration handshake.
//!
//! The agent announces the device on [`REGISTER_TOPIC`] and repeats the
//! announcement every [`REGISTER_RETRY_MS`] until the hub acknowledges it,
//! either explicitly or by activating the device. There is no backoff and no
//! attempt limit. The retry is a deadline checked by the caller's clock, so
//! nothing here blocks.

use super::device::{
    Device, MAX_ENTRIES, MAX_ID_LEN, MAX_KEY_LEN, MAX_LABEL_LEN, MAX_LABELS, MAX_NAME_LEN,
    MAX_VALUE_LEN,
};
use super::error::Error;
use super::router::REGISTER_TOPIC;
use crate::network::pubsub::Transport;

/// Delay between registration attempts.
pub const REGISTER_RETRY_MS: u64 = 3000;

/// A JSON string of `len` bytes, quoted, with every byte escaped as `\u00XX`.
const fn quoted(len: usize) -> usize {
    2 + 6 * len
}

/// A full metadata map.
const MAP_LEN: usize = 2 + MAX_ENTRIES * (quoted(MAX_KEY_LEN) + 1 + quoted(MAX_VALUE_LEN) + 1);

/// Field names, separators and the two ordinals.
const FIELDS_LEN: usize = 128;

/// Size of the buffer the device snapshot is serialised into.
///
/// Large enough for a device whose strings, labels and maps are all at
/// capacity and consist only of characters that need escaping, so
/// serialising a [`Device`] cannot run out of room.
pub const MAX_SNAPSHOT_LEN: usize = FIELDS_LEN
    + quoted(MAX_ID_LEN)
    + quoted(MAX_NAME_LEN)
    + 2
    + MAX_LABELS * (quoted(MAX_LABEL_LEN) + 1)
    + 3 * MAP_LEN;

/// A cancelable one-shot deadline on a millisecond clock.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryTimer {
    deadline: Option<u64>,
}

impl RetryTimer {
    /// Fire `delay_ms` after `now_ms`, replacing any earlier deadline.
    pub fn arm(&mut self, now_ms: u64, delay_ms: u64) {
        self.deadline = Some(now_ms.saturating_add(delay_ms));
    }

    /// Drop the pending deadline, if any.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Whether a deadline is pending.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// The pending deadline.
    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    /// Disarm and return `true` if the deadline has been reached.
    pub fn expire(&mut self, now_ms: u64) -> bool {
        match self.deadline {
            Some(deadline) if now_ms >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Where the handshake stands.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistrationState {
    /// Nothing published yet.
    Unregistered,
    /// Announced at least once, waiting for the hub.
    Registering,
    /// Acknowledged. Terminal.
    Registered,
}

/// Registration state machine.
#[derive(Debug, Default, Clone)]
pub struct Registration {
    registered: bool,
    attempts: u32,
    retry: RetryTimer,
}

impl Registration {
    /// A fresh, unregistered state machine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the hub has acknowledged the device.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Current state.
    pub fn state(&self) -> RegistrationState {
        if self.registered {
            RegistrationState::Registered
        } else if self.attempts > 0 {
            RegistrationState::Registering
        } else {
            RegistrationState::Unregistered
        }
    }

    /// Number of registration attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The pending retry.
    pub fn retry(&self) -> &RetryTimer {
        &self.retry
    }

    /// Publish the device snapshot and schedule the next attempt.
    ///
    /// Fails with [`Error::NotConnected`] without a live session. Otherwise
    /// the retry is scheduled first, so an attempt that fails to serialise or
    /// to publish is made again on the next interval.
    pub fn register<T: Transport>(
        &mut self,
        session: Option<&mut T>,
        device: &Device,
        now_ms: u64,
    ) -> Result<(), Error> {
        let session = session.ok_or(Error::NotConnected)?;

        self.retry.arm(now_ms, REGISTER_RETRY_MS);
        self.attempts = self.attempts.saturating_add(1);
        debug!("registering {} (attempt {})", device.id(), self.attempts);

        let mut buf = [0u8; MAX_SNAPSHOT_LEN];
        let len = serde_json_core::to_slice(device, &mut buf).map_err(|_| {
            error!("snapshot of {} does not fit", device.id());
            Error::Serialize
        })?;
        session.publish(REGISTER_TOPIC, &buf[..len])?;
        Ok(())
    }

    /// Run a due retry. Returns `true` if a snapshot was published.
    ///
    /// Once registered, an expired deadline publishes nothing.
    pub fn on_timer<T: Transport>(
        &mut self,
        session: Option<&mut T>,
        device: &Device,
        now_ms: u64,
    ) -> Result<bool, Error> {
        if !self.retry.expire(now_ms) || self.registered {
            return Ok(false);
        }
        self.register(session, device, now_ms).map(|_| true)
    }

    /// Mark the device as registered and drop the pending retry.
    pub fn acknowledge(&mut self) {
        if !self.registered {
            info!("registration acknowledged after {} attempt(s)", self.attempts);
        }
        self.registered = true;
        self.retry.cancel();
    }

    /// Drop the pending retry without changing the registration flag.
    pub fn cancel(&mut self) {
        self.retry.cancel();
    }
}

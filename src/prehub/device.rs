//! Device identity and runtime state.

use super::error::Error;
use heapless::{FnvIndexMap, FnvIndexSet, String};
use serde::{Serialize, Serializer};

/// Maximum length of a device id.
pub const MAX_ID_LEN: usize = 64;
/// Maximum length of a device name.
pub const MAX_NAME_LEN: usize = 64;
/// Maximum number of labels on a device.
pub const MAX_LABELS: usize = 8;
/// Maximum length of a single label.
pub const MAX_LABEL_LEN: usize = 32;
/// Maximum number of entries in each metadata map.
pub const MAX_ENTRIES: usize = 16;
/// Maximum length of a metadata key.
pub const MAX_KEY_LEN: usize = 32;
/// Maximum length of a metadata value.
pub const MAX_VALUE_LEN: usize = 64;

/// A flat string-to-string map, as carried by config and metadata messages.
pub type Metadata = FnvIndexMap<String<MAX_KEY_LEN>, String<MAX_VALUE_LEN>, MAX_ENTRIES>;

/// Labels attached to a device.
pub type Labels = FnvIndexSet<String<MAX_LABEL_LEN>, MAX_LABELS>;

/// What kind of device this is. Fixed at creation.
///
/// Serialised as its ordinal, which is what hubs expect on the wire.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Activity {
    /// Sensor.
    Sense = 0,
    /// Scanner.
    Scan = 1,
    /// Binds other devices together.
    Bind = 2,
    /// Printer.
    Print = 3,
    /// Switch or relay.
    Switch = 4,
    /// A hub acting as a device.
    PreHub = 5,
    /// Display.
    Display = 6,
}

impl Serialize for Activity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Runtime status, driven by hub commands.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// Registered or not, but not doing work for the hub.
    #[default]
    Idle = 0,
    /// Activated by the hub.
    Active = 1,
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Which of the device's maps an update targets.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MapKind {
    /// `deviceConfig`
    Config,
    /// `deviceMetadata`
    Device,
    /// `payloadMetadata`
    Payload,
}

/// A device managed by the agent.
///
/// The serialised form is the registration snapshot published to the hub:
///
/// ```rust
/// use libprehub::prehub::{Activity, Device};
///
/// let device = Device::new("d1", "porch sensor", Activity::Sense).unwrap();
/// let mut buf = [0u8; 256];
/// let len = serde_json_core::to_slice(&device, &mut buf).unwrap();
/// assert_eq!(
///     core::str::from_utf8(&buf[..len]).unwrap(),
///     r#"{"id":"d1","name":"porch sensor","activity":0,"status":0,"labels":[],"deviceConfig":{},"deviceMetadata":{},"payloadMetadata":{}}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    id: String<MAX_ID_LEN>,
    name: String<MAX_NAME_LEN>,
    activity: Activity,
    status: Status,
    labels: Labels,
    device_config: Metadata,
    device_metadata: Metadata,
    payload_metadata: Metadata,
}

impl Device {
    /// Create an idle device with empty labels and maps.
    ///
    /// Fails with [`Error::CapacityExceeded`] if `id` or `name` is too long.
    pub fn new(id: &str, name: &str, activity: Activity) -> Result<Self, Error> {
        Ok(Self {
            id: String::try_from(id).map_err(|_| Error::CapacityExceeded)?,
            name: String::try_from(name).map_err(|_| Error::CapacityExceeded)?,
            activity,
            status: Status::Idle,
            labels: Labels::new(),
            device_config: Metadata::new(),
            device_metadata: Metadata::new(),
            payload_metadata: Metadata::new(),
        })
    }

    /// Add a label. Adding a label that is already present is a no-op.
    pub fn with_label(mut self, label: &str) -> Result<Self, Error> {
        let label = String::try_from(label).map_err(|_| Error::CapacityExceeded)?;
        self.labels
            .insert(label)
            .map_err(|_| Error::CapacityExceeded)?;
        Ok(self)
    }

    /// Stable device id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Descriptive name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed classification.
    pub fn activity(&self) -> Activity {
        self.activity
    }

    /// Current runtime status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Opaque labels.
    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// `deviceConfig` map.
    pub fn config(&self) -> &Metadata {
        &self.device_config
    }

    /// `deviceMetadata` map.
    pub fn device_metadata(&self) -> &Metadata {
        &self.device_metadata
    }

    /// `payloadMetadata` map.
    pub fn payload_metadata(&self) -> &Metadata {
        &self.payload_metadata
    }

    /// Idle → Active. Returns `false` and leaves the status alone if the
    /// device was already active.
    pub(crate) fn activate(&mut self) -> bool {
        if self.status != Status::Idle {
            return false;
        }
        self.status = Status::Active;
        true
    }

    /// Active → Idle. Returns `false` if the device was already idle.
    pub(crate) fn deactivate(&mut self) -> bool {
        if self.status != Status::Active {
            return false;
        }
        self.status = Status::Idle;
        true
    }

    /// Mutable access to one of the three maps.
    pub fn map_mut(&mut self, kind: MapKind) -> &mut Metadata {
        match kind {
            MapKind::Config => &mut self.device_config,
            MapKind::Device => &mut self.device_metadata,
            MapKind::Payload => &mut self.payload_metadata,
        }
    }

    /// Merge `updates` into the map selected by `kind`. See [`merge`].
    pub fn update(&mut self, kind: MapKind, updates: &Metadata) -> Result<(), Error> {
        merge(self.map_mut(kind), updates)
    }
}

/// Apply `updates` to `target`, last write wins.
///
/// Every entry of `updates` overwrites the value stored under the same key.
/// New keys that do not fit because `target` is full are skipped; the
/// remaining entries are still applied and [`Error::CapacityExceeded`] is
/// returned afterwards.
pub fn merge(target: &mut Metadata, updates: &Metadata) -> Result<(), Error> {
    let mut overflow = false;
    for (key, value) in updates {
        if target.insert(key.clone(), value.clone()).is_err() {
            overflow = true;
        }
    }
    if overflow {
        Err(Error::CapacityExceeded)
    } else {
        Ok(())
    }
}

/// Parse a flat JSON object of string values.
///
/// Escape sequences are decoded, so the stored text is what the sender
/// meant rather than its JSON spelling.
pub fn parse_metadata(payload: &[u8]) -> Result<Metadata, Error> {
    // keys and values are unescaped one at a time through this buffer
    let mut unescaped = [0u8; MAX_VALUE_LEN];
    serde_json_core::from_slice_escaped::<Metadata>(payload, &mut unescaped)
        .map(|(map, _)| map)
        .map_err(|_| Error::Deserialize)
}

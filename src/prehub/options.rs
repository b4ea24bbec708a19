//! Connection settings for the agent.

use super::error::Error;
use crate::network::application::mqtt::{
    DEFAULT_MAX_IDLE_READS, Options as MqttOptions, ProtocolVersion,
};
use core::fmt::Write as _;
use heapless::String;

/// Maximum length of `host:port`.
pub const MAX_REMOTE_LEN: usize = 128;

/// How the agent reaches the broker.
///
/// One instance per agent; nothing here is global. Start from
/// [`ConnectOptions::default`] and override what differs:
///
/// ```rust
/// use libprehub::prehub::ConnectOptions;
///
/// let options = ConnectOptions::default()
///     .host("hub.local")
///     .port(8883)
///     .username("device")
///     .password(b"secret");
///
/// assert_eq!(options.remote().unwrap().as_str(), "hub.local:8883");
/// assert!(options.clean_session);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectOptions<'a> {
    /// Broker host name or address. Default `localhost`.
    pub host: &'a str,
    /// Broker port. Default 1883.
    pub port: u16,
    /// User name. Default none.
    pub username: Option<&'a str>,
    /// Password, only sent with a user name. Default none.
    pub password: Option<&'a [u8]>,
    /// MQTT revision. Default 3.1.1.
    pub protocol: ProtocolVersion,
    /// How long the platform may take to open the connection. Default 30 s.
    pub connect_timeout_ms: u32,
    /// Start without broker-side session state. Default `true`.
    pub clean_session: bool,
    /// Keep-alive interval in seconds, 0 to disable. Default 60.
    pub keep_alive_seconds: u16,
    /// Client identifier. Defaults to the device id.
    pub client_id: Option<&'a str>,
    /// Empty reads tolerated while waiting for the broker. Default 100.
    pub max_idle_reads: u32,
}

impl Default for ConnectOptions<'_> {
    fn default() -> Self {
        Self {
            host: "localhost",
            port: 1883,
            username: None,
            password: None,
            protocol: ProtocolVersion::V3_1_1,
            connect_timeout_ms: 30_000,
            clean_session: true,
            keep_alive_seconds: 60,
            client_id: None,
            max_idle_reads: DEFAULT_MAX_IDLE_READS,
        }
    }
}

impl<'a> ConnectOptions<'a> {
    /// Set the broker host.
    pub fn host(mut self, host: &'a str) -> Self {
        self.host = host;
        self
    }

    /// Set the broker port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the user name.
    pub fn username(mut self, username: &'a str) -> Self {
        self.username = Some(username);
        self
    }

    /// Set the password.
    pub fn password(mut self, password: &'a [u8]) -> Self {
        self.password = Some(password);
        self
    }

    /// Set the MQTT revision.
    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    /// Set the clean-session flag.
    pub fn clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    /// Set the keep-alive interval.
    pub fn keep_alive_seconds(mut self, seconds: u16) -> Self {
        self.keep_alive_seconds = seconds;
        self
    }

    /// Use `client_id` instead of the device id.
    pub fn client_id(mut self, client_id: &'a str) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Set how many empty reads a wait for the broker tolerates.
    pub fn max_idle_reads(mut self, reads: u32) -> Self {
        self.max_idle_reads = reads;
        self
    }

    /// `host:port`, as handed to [`Connect`](crate::network::Connect).
    pub fn remote(&self) -> Result<String<MAX_REMOTE_LEN>, Error> {
        let mut remote = String::new();
        write!(remote, "{}:{}", self.host, self.port).map_err(|_| Error::CapacityExceeded)?;
        Ok(remote)
    }

    /// MQTT CONNECT options for the device `device_id`.
    pub fn mqtt_options<'b>(&'b self, device_id: &'b str) -> MqttOptions<'b> {
        MqttOptions {
            client_id: self.client_id.unwrap_or(device_id),
            keep_alive_seconds: self.keep_alive_seconds,
            clean_session: self.clean_session,
            username: self.username,
            password: self.password,
            protocol: self.protocol,
            max_idle_reads: self.max_idle_reads,
        }
    }
}

//! MQTT 3.1 / 3.1.1 client implementation for embedded systems.
//!
//! The client is connection agnostic: it writes packets to and reads packets
//! from anything implementing [`Connection`]. All buffers are fixed-size
//! `heapless` collections, so memory use is known at compile time.
//!
//! Acknowledgements for SUBSCRIBE and UNSUBSCRIBE are awaited synchronously.
//! PUBLISH packets that arrive while an acknowledgement is outstanding are
//! queued and returned by later calls to [`Client::poll`].
//!
//! An empty read means no data yet, never end of stream. Waits for CONNACK,
//! for an acknowledgement or for the rest of a partly received packet keep
//! reading until [`Options::max_idle_reads`] empty reads in a row, then fail
//! with [`Error::Timeout`].

use crate::network::error::Error;
use crate::network::pubsub::{MAX_PAYLOAD_LEN, MAX_TOPIC_LEN, Message, Transport};
use crate::network::{Connection, Read, Write};
use heapless::{Deque, String, Vec};

// MQTT Control Packet types - these are the fixed header packet type values
const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const PUBACK: u8 = 0x40;
const SUBSCRIBE: u8 = 0x82;
const SUBACK: u8 = 0x90;
const UNSUBSCRIBE: u8 = 0xA2;
const UNSUBACK: u8 = 0xB0;
const PINGREQ: u8 = 0xC0;
const DISCONNECT: u8 = 0xE0;

// CONNECT flags
const FLAG_USERNAME: u8 = 0x80;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_CLEAN_SESSION: u8 = 0x02;

/// Largest packet body the client will buffer on receive.
const MAX_PACKET_LEN: usize = MAX_TOPIC_LEN + MAX_PAYLOAD_LEN + 4;

/// Number of publishes that can be held back while waiting for an ack.
const PENDING_CAPACITY: usize = 4;

/// Default for [`Options::max_idle_reads`].
pub const DEFAULT_MAX_IDLE_READS: u32 = 100;

/// An incoming MQTT publish message.
pub type PublishPacket = Message;

/// Quality of Service levels for MQTT messages.
///
/// # Examples
///
/// ```rust
/// use libprehub::network::application::mqtt::QoS;
///
/// assert_eq!(QoS::AtMostOnce as u8, 0);
/// assert_eq!(QoS::AtLeastOnce as u8, 1);
/// assert_eq!(QoS::ExactlyOnce as u8, 2);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QoS {
    /// **QoS 0**: At most once delivery.
    AtMostOnce = 0,
    /// **QoS 1**: At least once delivery.
    AtLeastOnce = 1,
    /// **QoS 2**: Exactly once delivery.
    ExactlyOnce = 2,
}

/// MQTT protocol revision announced in the CONNECT packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum ProtocolVersion {
    /// MQTT 3.1 (protocol name `MQIsdp`, level 3).
    V3_1,
    /// MQTT 3.1.1 (protocol name `MQTT`, level 4).
    #[default]
    V3_1_1,
}

impl ProtocolVersion {
    fn name(self) -> &'static [u8] {
        match self {
            ProtocolVersion::V3_1 => b"MQIsdp",
            ProtocolVersion::V3_1_1 => b"MQTT",
        }
    }

    fn level(self) -> u8 {
        match self {
            ProtocolVersion::V3_1 => 3,
            ProtocolVersion::V3_1_1 => 4,
        }
    }
}

/// Configuration options for MQTT client connection.
///
/// # Examples
///
/// ```rust
/// use libprehub::network::application::mqtt::{Options, ProtocolVersion};
///
/// let options = Options {
///     client_id: "my_iot_device",
///     username: Some("device"),
///     password: Some(b"secret"),
///     ..Options::default()
/// };
/// assert_eq!(options.keep_alive_seconds, 60);
/// assert_eq!(options.protocol, ProtocolVersion::V3_1_1);
/// ```
#[derive(Debug, Clone)]
pub struct Options<'a> {
    /// The client identifier, must be unique within the broker.
    ///
    /// MQTT 3.1 brokers reject identifiers longer than 23 bytes.
    pub client_id: &'a str,

    /// The keep-alive time interval in seconds. A value of 0 disables
    /// keep-alive.
    pub keep_alive_seconds: u16,

    /// Whether to start a clean session.
    ///
    /// - `true`: The broker will discard any previous session state and start fresh
    /// - `false`: The broker will resume the previous session if one exists
    pub clean_session: bool,

    /// Optional user name sent in the CONNECT packet.
    pub username: Option<&'a str>,

    /// Optional password. Only sent together with a user name.
    pub password: Option<&'a [u8]>,

    /// Protocol revision to announce.
    pub protocol: ProtocolVersion,

    /// Consecutive empty reads tolerated while waiting for the broker.
    ///
    /// With a socket read timeout of `t` a wait gives up after roughly
    /// `t * max_idle_reads`.
    pub max_idle_reads: u32,
}

impl Default for Options<'_> {
    fn default() -> Self {
        Self {
            client_id: "",
            keep_alive_seconds: 60,
            clean_session: true,
            username: None,
            password: None,
            protocol: ProtocolVersion::default(),
            max_idle_reads: DEFAULT_MAX_IDLE_READS,
        }
    }
}

/// A packet read from the broker.
enum Packet {
    Publish(PublishPacket),
    Ack { kind: u8, packet_id: u16, code: u8 },
    Other,
}

/// An MQTT client for publish-subscribe messaging.
///
/// # Type Parameters
///
/// * `C` - The connection type implementing [`Connection`]
pub struct Client<C: Connection> {
    connection: C,
    next_packet_id: u16,
    max_idle_reads: u32,
    pending: Deque<PublishPacket, PENDING_CAPACITY>,
}

impl<C: Connection> core::fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("next_packet_id", &self.next_packet_id)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl<C: Connection> Client<C> {
    /// Establish an MQTT connection with the broker.
    ///
    /// Sends a CONNECT packet and waits for the CONNACK response.
    ///
    /// # Errors
    ///
    /// * [`Error::WriteError`] - Failed to send CONNECT packet
    /// * [`Error::ReadError`] - Failed to read CONNACK response
    /// * [`Error::Timeout`] - No CONNACK within `max_idle_reads` empty reads
    /// * [`Error::ConnectionRefused`] - Broker refused the connection
    /// * [`Error::ProtocolError`] - Invalid CONNACK packet received
    /// * [`Error::BufferOverflow`] - Identifier or credentials too long
    pub fn connect(mut connection: C, options: &Options) -> Result<Self, Error> {
        // --- Variable Header ---
        let mut vh: Vec<u8, 12> = Vec::new();
        push_prefixed(&mut vh, options.protocol.name())?;
        push(&mut vh, &[options.protocol.level()])?;

        let mut connect_flags = 0;
        if options.clean_session {
            connect_flags |= FLAG_CLEAN_SESSION;
        }
        if options.username.is_some() {
            connect_flags |= FLAG_USERNAME;
            if options.password.is_some() {
                connect_flags |= FLAG_PASSWORD;
            }
        }
        push(&mut vh, &[connect_flags])?;
        push(&mut vh, &options.keep_alive_seconds.to_be_bytes())?;

        // --- Payload ---
        let mut payload: Vec<u8, 512> = Vec::new();
        push_prefixed(&mut payload, options.client_id.as_bytes())?;
        if let Some(username) = options.username {
            push_prefixed(&mut payload, username.as_bytes())?;
            if let Some(password) = options.password {
                push_prefixed(&mut payload, password)?;
            }
        }

        // --- Fixed Header ---
        let mut fixed_header: Vec<u8, 5> = Vec::new();
        push(&mut fixed_header, &[CONNECT])?;
        encode_remaining_length(&mut fixed_header, vh.len() + payload.len())?;

        write_all(&mut connection, &fixed_header)?;
        write_all(&mut connection, &vh)?;
        write_all(&mut connection, &payload)?;
        connection.flush().map_err(|_| Error::WriteError)?;

        // Wait for and parse CONNACK
        let mut connack_buf = [0u8; 4];
        read_exact(&mut connection, &mut connack_buf, options.max_idle_reads)?;

        if connack_buf[0] != CONNACK || connack_buf[1] != 2 {
            return Err(Error::ProtocolError);
        }

        match connack_buf[3] {
            0 => Ok(Self {
                connection,
                next_packet_id: 1,
                max_idle_reads: options.max_idle_reads,
                pending: Deque::new(),
            }),
            1..=5 => Err(Error::ConnectionRefused),
            _ => Err(Error::ProtocolError),
        }
    }

    /// Publish a message to a specific topic.
    ///
    /// QoS 1 and 2 packets carry a packet identifier; their acknowledgements
    /// are consumed by [`poll`](Client::poll) rather than awaited here.
    ///
    /// # Errors
    ///
    /// * [`Error::WriteError`] - Failed to send the publish packet
    /// * [`Error::ProtocolError`] - Topic name too long for the wire format
    pub fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), Error> {
        let topic_len = u16::try_from(topic.len()).map_err(|_| Error::ProtocolError)?;
        let with_id = qos != QoS::AtMostOnce;

        let mut remaining_len = 2 + topic.len() + payload.len();
        if with_id {
            remaining_len += 2;
        }

        let mut fixed_header: Vec<u8, 5> = Vec::new();
        push(&mut fixed_header, &[PUBLISH | ((qos as u8) << 1)])?;
        encode_remaining_length(&mut fixed_header, remaining_len)?;

        write_all(&mut self.connection, &fixed_header)?;
        write_all(&mut self.connection, &topic_len.to_be_bytes())?;
        write_all(&mut self.connection, topic.as_bytes())?;
        if with_id {
            let packet_id = self.next_packet_id();
            write_all(&mut self.connection, &packet_id.to_be_bytes())?;
        }
        write_all(&mut self.connection, payload)?;
        self.connection.flush().map_err(|_| Error::WriteError)
    }

    /// Subscribe to a topic filter and wait for the SUBACK.
    ///
    /// # Errors
    ///
    /// * [`Error::WriteError`] - Failed to send the subscribe packet
    /// * [`Error::ReadError`] - Failed to read SUBACK response
    /// * [`Error::Timeout`] - No SUBACK within `max_idle_reads` empty reads
    /// * [`Error::ConnectionRefused`] - Broker rejected the subscription
    /// * [`Error::ProtocolError`] - Invalid SUBACK packet or topic filter
    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Error> {
        let packet_id = self.next_packet_id();
        self.send_topic_packet(SUBSCRIBE, packet_id, topic, Some(qos as u8))?;

        match self.await_ack(SUBACK, packet_id)? {
            0x80 => Err(Error::ConnectionRefused),
            code if code <= 2 => Ok(()),
            _ => Err(Error::ProtocolError),
        }
    }

    /// Unsubscribe from a topic filter and wait for the UNSUBACK.
    pub fn unsubscribe(&mut self, topic: &str) -> Result<(), Error> {
        let packet_id = self.next_packet_id();
        self.send_topic_packet(UNSUBSCRIBE, packet_id, topic, None)?;
        self.await_ack(UNSUBACK, packet_id).map(|_| ())
    }

    /// Send a PINGREQ. The PINGRESP is consumed by [`poll`](Client::poll).
    pub fn ping(&mut self) -> Result<(), Error> {
        write_all(&mut self.connection, &[PINGREQ, 0])?;
        self.connection.flush().map_err(|_| Error::WriteError)
    }

    /// Poll the connection for incoming PUBLISH messages.
    ///
    /// Returns `Ok(None)` immediately if no data is available or the packet
    /// read was not a PUBLISH (acknowledgements, PINGRESP). Call it regularly
    /// in the application's main loop.
    ///
    /// # Errors
    ///
    /// * [`Error::ReadError`] - Failed to read from the connection
    /// * [`Error::ProtocolError`] - Received malformed MQTT packet
    /// * [`Error::BufferOverflow`] - Packet larger than the receive buffer;
    ///   the packet is discarded and the stream stays in sync
    pub fn poll(&mut self) -> Result<Option<PublishPacket>, Error> {
        if let Some(packet) = self.pending.pop_front() {
            return Ok(Some(packet));
        }

        match self.read_packet(false)? {
            Some(Packet::Publish(packet)) => Ok(Some(packet)),
            _ => Ok(None),
        }
    }

    /// Send DISCONNECT and close the underlying connection.
    pub fn disconnect(mut self) -> Result<(), Error> {
        let sent = write_all(&mut self.connection, &[DISCONNECT, 0])
            .and_then(|_| self.connection.flush().map_err(|_| Error::WriteError));
        let closed = self.connection.close().map_err(|_| Error::ConnectionClosed);
        sent.and(closed)
    }

    fn next_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        id
    }

    fn send_topic_packet(
        &mut self,
        header: u8,
        packet_id: u16,
        topic: &str,
        qos: Option<u8>,
    ) -> Result<(), Error> {
        let topic_len = u16::try_from(topic.len()).map_err(|_| Error::ProtocolError)?;
        let remaining_len = 4 + topic.len() + usize::from(qos.is_some());

        let mut fixed_header: Vec<u8, 5> = Vec::new();
        push(&mut fixed_header, &[header])?;
        encode_remaining_length(&mut fixed_header, remaining_len)?;

        write_all(&mut self.connection, &fixed_header)?;
        write_all(&mut self.connection, &packet_id.to_be_bytes())?;
        write_all(&mut self.connection, &topic_len.to_be_bytes())?;
        write_all(&mut self.connection, topic.as_bytes())?;
        if let Some(qos) = qos {
            write_all(&mut self.connection, &[qos])?;
        }
        self.connection.flush().map_err(|_| Error::WriteError)
    }

    /// Read packets until the acknowledgement `kind` for `packet_id` arrives,
    /// returning its first return code (0 for UNSUBACK).
    fn await_ack(&mut self, kind: u8, packet_id: u16) -> Result<u8, Error> {
        loop {
            match self.read_packet(true)? {
                Some(Packet::Ack {
                    kind: k,
                    packet_id: id,
                    code,
                }) if k == kind => {
                    if id != packet_id {
                        return Err(Error::ProtocolError);
                    }
                    return Ok(code);
                }
                Some(Packet::Publish(packet)) => {
                    self.pending
                        .push_back(packet)
                        .map_err(|_| Error::BufferOverflow)?;
                }
                _ => {}
            }
        }
    }

    /// Read one packet. With `wait == false` an empty first read yields
    /// `None`; otherwise the client waits for the packet to start. Once a
    /// packet has started its remainder is always waited for.
    fn read_packet(&mut self, wait: bool) -> Result<Option<Packet>, Error> {
        let idle = self.max_idle_reads;
        let mut header_buf = [0u8; 1];
        if wait {
            read_exact(&mut self.connection, &mut header_buf, idle)?;
        } else {
            match self.connection.read(&mut header_buf) {
                Ok(0) => return Ok(None),
                Ok(_) => {}
                Err(_) => return Err(Error::ReadError),
            }
        }
        let header = header_buf[0];
        let remaining_len = read_remaining_length(&mut self.connection, idle)?;

        if remaining_len > MAX_PACKET_LEN {
            discard(&mut self.connection, remaining_len, idle)?;
            return Err(Error::BufferOverflow);
        }

        let mut body = Vec::<u8, MAX_PACKET_LEN>::new();
        body.resize(remaining_len, 0)
            .map_err(|_| Error::BufferOverflow)?;
        read_exact(&mut self.connection, &mut body, idle)?;

        match header & 0xF0 {
            PUBLISH => self.parse_publish(header, &body).map(|p| Some(Packet::Publish(p))),
            SUBACK | UNSUBACK | PUBACK => {
                if body.len() < 2 {
                    return Err(Error::ProtocolError);
                }
                Ok(Some(Packet::Ack {
                    kind: header & 0xF0,
                    packet_id: u16::from_be_bytes([body[0], body[1]]),
                    code: body.get(2).copied().unwrap_or(0),
                }))
            }
            _ => Ok(Some(Packet::Other)),
        }
    }

    fn parse_publish(&mut self, header: u8, body: &[u8]) -> Result<PublishPacket, Error> {
        let qos = (header >> 1) & 0x03;
        if body.len() < 2 {
            return Err(Error::ProtocolError);
        }
        let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
        let topic_end = 2 + topic_len;
        let payload_start = if qos > 0 { topic_end + 2 } else { topic_end };
        if body.len() < payload_start {
            return Err(Error::ProtocolError);
        }

        let topic = core::str::from_utf8(&body[2..topic_end]).map_err(|_| Error::ProtocolError)?;
        let topic = String::try_from(topic).map_err(|_| Error::BufferOverflow)?;
        let payload = Vec::from_slice(&body[payload_start..]).map_err(|_| Error::BufferOverflow)?;

        if qos == 1 {
            let id = [body[topic_end], body[topic_end + 1]];
            write_all(&mut self.connection, &[PUBACK, 2, id[0], id[1]])?;
            self.connection.flush().map_err(|_| Error::WriteError)?;
        }

        Ok(PublishPacket { topic, payload })
    }
}

impl<C: Connection> Transport for Client<C> {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Error> {
        Client::publish(self, topic, payload, QoS::AtMostOnce)
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), Error> {
        Client::subscribe(self, topic, QoS::AtMostOnce)
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), Error> {
        Client::unsubscribe(self, topic)
    }

    fn poll(&mut self) -> Result<Option<Message>, Error> {
        Client::poll(self)
    }

    fn ping(&mut self) -> Result<(), Error> {
        Client::ping(self)
    }

    fn disconnect(self) -> Result<(), Error> {
        Client::disconnect(self)
    }
}

fn push<const N: usize>(buf: &mut Vec<u8, N>, bytes: &[u8]) -> Result<(), Error> {
    buf.extend_from_slice(bytes)
        .map_err(|_| Error::BufferOverflow)
}

/// Append a length-prefixed field (two byte big-endian length).
fn push_prefixed<const N: usize>(buf: &mut Vec<u8, N>, bytes: &[u8]) -> Result<(), Error> {
    let len = u16::try_from(bytes.len()).map_err(|_| Error::ProtocolError)?;
    push(buf, &len.to_be_bytes())?;
    push(buf, bytes)
}

fn write_all<W: Write>(connection: &mut W, mut buf: &[u8]) -> Result<(), Error> {
    while !buf.is_empty() {
        match connection.write(buf) {
            Ok(0) => return Err(Error::WriteError),
            Ok(n) => buf = &buf[n..],
            Err(_) => return Err(Error::WriteError),
        }
    }
    Ok(())
}

/// Fill `buf`, giving up after `max_idle` empty reads in a row.
fn read_exact<R: Read>(connection: &mut R, buf: &mut [u8], max_idle: u32) -> Result<(), Error> {
    let mut total_read = 0;
    let mut idle = 0;
    while total_read < buf.len() {
        match connection.read(&mut buf[total_read..]) {
            Ok(0) => {
                idle += 1;
                if idle > max_idle {
                    return Err(Error::Timeout);
                }
            }
            Ok(n) => {
                total_read += n;
                idle = 0;
            }
            Err(_) => return Err(Error::ReadError),
        }
    }
    Ok(())
}

fn discard<R: Read>(connection: &mut R, mut len: usize, max_idle: u32) -> Result<(), Error> {
    let mut scratch = [0u8; 64];
    while len > 0 {
        let chunk = len.min(scratch.len());
        read_exact(connection, &mut scratch[..chunk], max_idle)?;
        len -= chunk;
    }
    Ok(())
}

/// Encode the remaining length field for an MQTT packet.
///
/// The encoding uses up to 4 bytes where each byte encodes 7 bits of the length
/// value. The most significant bit indicates if another byte follows.
fn encode_remaining_length(buf: &mut Vec<u8, 5>, mut len: usize) -> Result<(), Error> {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.push(byte).map_err(|_| Error::ProtocolError)?;
        if len == 0 {
            break;
        }
    }
    Ok(())
}

fn read_remaining_length<R: Read>(connection: &mut R, max_idle: u32) -> Result<usize, Error> {
    let mut remaining_len = 0;
    let mut multiplier = 1;
    for _ in 0..4 {
        let mut byte = [0u8; 1];
        read_exact(connection, &mut byte, max_idle)?;
        remaining_len += (byte[0] as usize & 127) * multiplier;
        if byte[0] & 0x80 == 0 {
            return Ok(remaining_len);
        }
        multiplier *= 128;
    }
    Err(Error::ProtocolError)
}

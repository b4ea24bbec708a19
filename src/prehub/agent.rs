//! Session ownership and the agent's event loop.

use super::device::Device;
use super::error::Error;
use super::options::ConnectOptions;
use super::registration::Registration;
use super::router::{self, Command, SUBSCRIPTIONS};
use crate::network::application::mqtt::Client;
use crate::network::error::Error as NetworkError;
use crate::network::pubsub::Transport;
use crate::network::{Connect, Connection};

/// The device agent.
///
/// Owns the [`Device`], the [`Registration`] state machine and, while
/// connected, the transport session. Every method takes `&mut self`, so all
/// state changes are serialised by the borrow checker; a host that drives the
/// agent from several threads wraps it in a single mutex.
///
/// Time is supplied by the caller as a monotonic millisecond count. Nothing
/// blocks: the registration retry and the keep-alive are deadlines checked by
/// [`tick`](Agent::tick), which [`poll`](Agent::poll) calls after each read.
///
/// ```rust,no_run
/// use libprehub::network::application::mqtt::Client;
/// use libprehub::prehub::{Activity, Agent, ConnectOptions, Device};
/// # use libprehub::network::{Close, Connect, Connection, Read, Write};
/// # struct Socket;
/// # impl Connection for Socket {}
/// # impl Read for Socket {
/// #     type Error = ();
/// #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
/// # }
/// # impl Write for Socket {
/// #     type Error = ();
/// #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
/// #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
/// # }
/// # impl Close for Socket {
/// #     type Error = ();
/// #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
/// # }
/// # struct Network;
/// # impl Connect for Network {
/// #     type Connection = Socket;
/// #     type Error = ();
/// #     fn connect(&mut self, _remote: &str, _timeout_ms: u32) -> Result<Socket, ()> { Ok(Socket) }
/// # }
/// # fn now_ms() -> u64 { 0 }
///
/// let device = Device::new("d1", "porch sensor", Activity::Sense).unwrap();
/// let mut agent: Agent<Client<Socket>> = Agent::new(device);
///
/// agent.connect(&mut Network, &ConnectOptions::default().host("hub.local"), now_ms()).unwrap();
/// loop {
///     if let Err(err) = agent.poll(now_ms()) {
///         // transport failure: reconnecting is up to the application
///         break;
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Agent<T: Transport> {
    device: Device,
    registration: Registration,
    session: Option<T>,
    keep_alive_ms: u64,
    last_sent_ms: u64,
}

impl<T: Transport> Agent<T> {
    /// Create a disconnected agent for `device`.
    pub fn new(device: Device) -> Self {
        Self {
            device,
            registration: Registration::new(),
            session: None,
            keep_alive_ms: 0,
            last_sent_ms: 0,
        }
    }

    /// Ping the broker when nothing has been sent for `seconds`.
    /// Zero disables keep-alive.
    pub fn set_keep_alive(&mut self, seconds: u16) {
        self.keep_alive_ms = u64::from(seconds) * 1000;
    }

    /// The managed device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The registration state machine.
    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    /// Whether the hub has acknowledged the device.
    pub fn is_registered(&self) -> bool {
        self.registration.is_registered()
    }

    /// Whether a session is attached.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// The live session, if any.
    pub fn session(&self) -> Option<&T> {
        self.session.as_ref()
    }

    /// Take over an established session.
    ///
    /// Subscribes to the device's six command topics and publishes the first
    /// registration snapshot. If a subscription fails the session is torn
    /// down and the error returned. An already attached session is
    /// disconnected first.
    pub fn attach(&mut self, mut transport: T, now_ms: u64) -> Result<(), Error> {
        if self.session.is_some() {
            if let Err(err) = self.disconnect() {
                warn!("closing previous session failed: {}", err);
            }
        }

        if let Err(err) = subscribe_all(&mut transport, self.device.id()) {
            error!("subscribing for {} failed: {}", self.device.id(), err);
            if let Err(err) = transport.disconnect() {
                warn!("closing session failed: {}", err);
            }
            return Err(err);
        }

        info!("session up for {}", self.device.id());
        self.session = Some(transport);
        self.last_sent_ms = now_ms;
        self.register(now_ms)
    }

    /// Publish the registration snapshot and schedule a retry.
    ///
    /// Fails with [`Error::NotConnected`] before a session is attached.
    pub fn register(&mut self, now_ms: u64) -> Result<(), Error> {
        self.registration
            .register(self.session.as_mut(), &self.device, now_ms)?;
        self.last_sent_ms = now_ms;
        Ok(())
    }

    /// Handle one inbound message. Handler failures are logged, never
    /// returned.
    ///
    /// This has no clock, so a ping acknowledgment sent from here does not
    /// postpone the keep-alive. [`poll`](Agent::poll) accounts for it.
    pub fn handle_message(&mut self, topic: &str, payload: &[u8]) -> Option<Command> {
        router::route(
            topic,
            payload,
            &mut self.device,
            &mut self.registration,
            self.session.as_mut(),
        )
    }

    /// Read and handle at most one inbound message, then run [`tick`](Agent::tick).
    ///
    /// Returns the command handled, if any. Transport errors are returned to
    /// the caller; the session stays attached.
    pub fn poll(&mut self, now_ms: u64) -> Result<Option<Command>, Error> {
        let session = self.session.as_mut().ok_or(Error::NotConnected)?;
        let command = match session.poll()? {
            Some(message) => {
                trace!("message on {}", message.topic.as_str());
                self.handle_message(&message.topic, &message.payload)
            }
            None => None,
        };
        // the ping acknowledgment counts as traffic for the keep-alive
        if command == Some(Command::Ping) {
            self.last_sent_ms = now_ms;
        }
        self.tick(now_ms)?;
        Ok(command)
    }

    /// Fire a due registration retry and send a keep-alive ping if the
    /// session has been quiet for the keep-alive interval.
    pub fn tick(&mut self, now_ms: u64) -> Result<(), Error> {
        if self
            .registration
            .on_timer(self.session.as_mut(), &self.device, now_ms)?
        {
            self.last_sent_ms = now_ms;
        }

        if self.keep_alive_ms > 0 && now_ms.saturating_sub(self.last_sent_ms) >= self.keep_alive_ms {
            if let Some(session) = self.session.as_mut() {
                trace!("keep-alive ping");
                session.ping()?;
                self.last_sent_ms = now_ms;
            }
        }
        Ok(())
    }

    /// Cancel the registration retry, unsubscribe and close the session.
    ///
    /// The session is gone afterwards even if a step fails; the first
    /// failure is returned. Disconnecting without a session does nothing.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        self.registration.cancel();
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        let mut result = Ok(());
        for suffix in SUBSCRIPTIONS {
            let unsubscribed = router::device_topic(self.device.id(), suffix)
                .and_then(|topic| session.unsubscribe(&topic).map_err(Error::from));
            if let Err(err) = unsubscribed {
                warn!("unsubscribing from {} failed: {}", suffix, err);
                result = result.and(Err(err));
            }
        }
        if let Err(err) = session.disconnect() {
            warn!("closing session failed: {}", err);
            result = result.and(Err(Error::from(err)));
        }

        info!("session closed for {}", self.device.id());
        result
    }
}

impl<C: Connection> Agent<Client<C>> {
    /// Open a connection through `network`, perform the MQTT handshake and
    /// [`attach`](Agent::attach) the resulting session.
    ///
    /// Failures are logged and returned; there is no automatic retry.
    pub fn connect<N>(
        &mut self,
        network: &mut N,
        options: &ConnectOptions,
        now_ms: u64,
    ) -> Result<(), Error>
    where
        N: Connect<Connection = C>,
    {
        let remote = options.remote()?;
        let connection = network
            .connect(&remote, options.connect_timeout_ms)
            .map_err(|_| {
                error!("connecting to {} failed", remote.as_str());
                Error::Network(NetworkError::ConnectionRefused)
            })?;

        let client = Client::connect(connection, &options.mqtt_options(self.device.id()))
            .map_err(|err| {
                error!("MQTT handshake with {} failed: {}", remote.as_str(), err);
                Error::from(err)
            })?;

        self.set_keep_alive(options.keep_alive_seconds);
        self.attach(client, now_ms)
    }
}

fn subscribe_all<T: Transport>(transport: &mut T, device_id: &str) -> Result<(), Error> {
    for suffix in SUBSCRIPTIONS {
        let topic = router::device_topic(device_id, suffix)?;
        transport.subscribe(&topic)?;
        debug!("subscribed to {}", topic.as_str());
    }
    Ok(())
}

//! Real-time connection library surface.
//!
//! The engine only talks to connections through [`HubConnection`] and
//! creates them through a [`ConnectionFactory`]. [`memory`] provides the
//! in-process implementation used by the demo and the tests.

pub mod memory;

use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::error::ConnectionError;
pub use memory::{Hub, HubContext, HubNetwork, MemoryConnection};

/// Identifier of a registered message handler, unique per connection.
pub type HandlerId = u64;

pub type MessageCallback = Rc<dyn Fn(&Value)>;

/// A handler registered for one server event name.
#[derive(Clone)]
pub struct MessageHandler {
    id: HandlerId,
    callback: MessageCallback,
}

impl MessageHandler {
    pub fn new(id: HandlerId, callback: impl Fn(&Value) + 'static) -> Self {
        Self {
            id,
            callback: Rc::new(callback),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn call(&self, message: &Value) {
        (self.callback)(message)
    }
}

impl fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHandler").field("id", &self.id).finish()
    }
}

/// Observable lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Created,
    Pending,
    Active,
    Reconnecting,
    Stopped,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Reconnecting => "reconnecting",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client connection to one hub address.
///
/// `start` and `stop` return immediately; state changes are observed through
/// [`state`](HubConnection::state). `stop` is idempotent.
pub trait HubConnection {
    fn address(&self) -> &str;

    fn state(&self) -> ConnectionState;

    fn start(&self);

    fn stop(&self);

    /// Invoke `method` on the hub. Failures are reported by the connection.
    fn send(&self, method: &str, payload: Value);

    fn on(&self, event: &str, handler: MessageHandler);

    fn off(&self, event: &str, handler: HandlerId);
}

/// Creates connections for connection-owner elements.
pub trait ConnectionFactory {
    fn create(&self, address: &str) -> Result<Rc<dyn HubConnection>, ConnectionError>;
}

impl<F> ConnectionFactory for F
where
    F: Fn(&str) -> Result<Rc<dyn HubConnection>, ConnectionError>,
{
    fn create(&self, address: &str) -> Result<Rc<dyn HubConnection>, ConnectionError> {
        self(address)
    }
}

/// Builder mirroring the client library's fluent API.
#[derive(Debug, Clone, Default)]
pub struct HubConnectionBuilder {
    url: Option<String>,
    automatic_reconnect: bool,
    queue_sends: bool,
}

impl HubConnectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_automatic_reconnect(mut self) -> Self {
        self.automatic_reconnect = true;
        self
    }

    /// Queue sends made while the connection is not active and flush them
    /// once it is.
    pub fn with_send_queue(mut self) -> Self {
        self.queue_sends = true;
        self
    }

    pub fn build(self, network: &Rc<HubNetwork>) -> Result<Rc<MemoryConnection>, ConnectionError> {
        let url = self
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or(ConnectionError::MissingUrl)?;
        Ok(MemoryConnection::new(
            network,
            url,
            self.automatic_reconnect,
            self.queue_sends,
        ))
    }
}

/// Factory building [`MemoryConnection`]s on a shared [`HubNetwork`].
pub struct DefaultConnectionFactory {
    network: Rc<HubNetwork>,
    automatic_reconnect: bool,
    queue_sends: bool,
}

impl DefaultConnectionFactory {
    pub fn new(network: Rc<HubNetwork>) -> Self {
        Self {
            network,
            automatic_reconnect: true,
            queue_sends: false,
        }
    }

    pub fn from_config(network: Rc<HubNetwork>, config: &Config) -> Self {
        Self {
            network,
            automatic_reconnect: config.automatic_reconnect,
            queue_sends: config.queue_sends_until_connected,
        }
    }
}

impl ConnectionFactory for DefaultConnectionFactory {
    fn create(&self, address: &str) -> Result<Rc<dyn HubConnection>, ConnectionError> {
        let mut builder = HubConnectionBuilder::new().with_url(address);
        if self.automatic_reconnect {
            builder = builder.with_automatic_reconnect();
        }
        if self.queue_sends {
            builder = builder.with_send_queue();
        }
        let connection: Rc<dyn HubConnection> = builder.build(&self.network)?;
        Ok(connection)
    }
}

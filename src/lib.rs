//! hx-signalr: attribute-driven SignalR bindings for htmx-style pages.
//!
//! Elements declare their role with attributes and the [`Engine`] wires
//! them to hub connections:
//! - `signalr-connect="/hub"` owns a connection, started when processed and
//!   stopped when the element is removed
//! - `signalr-subscribe="a, b"` renders inbound messages into the page
//! - `signalr-send="method"` sends form values when its trigger fires
//!
//! The engine talks to the page through the [`Host`] trait. [`Document`]
//! is the in-memory implementation, and [`HubNetwork`] provides in-process
//! hubs and connections.

#![allow(clippy::new_without_default)]
#![allow(clippy::type_complexity)]
#![allow(clippy::collapsible_if)]

pub mod binding;
pub mod config;
pub mod connection;
pub mod demo;
pub mod dom;
pub mod error;
pub mod host;

pub use binding::{Engine, MessageEnvelope, ResponseTransform};
pub use config::Config;
pub use connection::{
    ConnectionFactory, ConnectionState, HubConnection, HubConnectionBuilder, HubNetwork,
    MemoryConnection,
};
pub use dom::{Document, NodeId};
pub use error::{ConnectionError, SignalrError};
pub use host::Host;

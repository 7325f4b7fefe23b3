//! Error types for the binding engine, configuration and connection library.

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors surfaced by the engine and its configuration layer.
#[derive(Debug, Error)]
pub enum SignalrError {
    #[error("SignalR connection library not found. Register a connection factory before processing nodes.")]
    MissingConnectionLibrary,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl SignalrError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for SignalrError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Errors reported by the connection library itself.
///
/// The engine never intercepts these; they are logged and recorded by the
/// connection that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("Hub connection builder requires a URL")]
    MissingUrl,

    #[error("No hub is mapped at '{0}'")]
    NoHub(String),

    #[error("Cannot send '{method}' to '{address}': connection is {state}")]
    NotConnected {
        address: String,
        method: String,
        state: ConnectionState,
    },
}

impl ConnectionError {
    pub fn not_connected(
        address: impl Into<String>,
        method: impl Into<String>,
        state: ConnectionState,
    ) -> Self {
        Self::NotConnected {
            address: address.into(),
            method: method.into(),
            state,
        }
    }
}

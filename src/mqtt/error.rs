//! Error types for the broker bridge.
//!
//! `TransportError` covers everything the reconnect loop can recover from: lost
//! connections, rejected handshakes, TLS failures. `BridgeError` is what callers of the
//! library see and wraps transport failures together with payload and configuration
//! problems.

use thiserror::Error;

use super::backoff::BackoffError;

/// Failures raised by a [`Session`](super::transport::Session) or while opening one.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Broker connection failed or was lost.
    ///
    /// Boxed because `rumqttc::ConnectionError` is large.
    #[error("Connection error: {0}")]
    Connection(#[from] Box<rumqttc::ConnectionError>),

    /// The local client could not queue a request (event loop gone, channel full).
    #[error("Client request error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// Broker refused the CONNECT packet.
    #[error("Connection refused by broker: {0:?}")]
    Refused(rumqttc::ConnectReturnCode),

    /// Trust roots could not be loaded or the TLS setup is invalid.
    #[error("TLS setup error: {0}")]
    Tls(String),

    /// The session was closed locally or the peer went away without an error.
    #[error("Session closed: {0}")]
    Closed(String),
}

impl From<rumqttc::ConnectionError> for TransportError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        TransportError::Connection(Box::new(err))
    }
}

/// The unified error type of the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Inbound payload on `topic` was not a valid JSON document of the expected shape.
    #[error("Failed to decode payload on '{topic}': {source}")]
    Decode {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// A publish was attempted while no session is established.
    #[error("Not connected to broker")]
    NotConnected,

    /// The credential source failed to produce a new token.
    #[error("Credential refresh failed: {0}")]
    Credential(String),

    /// `connect` was called while another call on the same manager is still running.
    #[error("Connection manager is already running")]
    AlreadyRunning,

    #[error("Reconnect policy exhausted: {0}")]
    RetriesExhausted(#[from] BackoffError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

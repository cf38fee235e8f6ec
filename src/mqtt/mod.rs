//! # MQTT Bridge Module
//!
//! Keeps a single long-lived session to the MirAIe broker and carries traffic in both
//! directions: status messages from air conditioners are routed to per-device handlers,
//! control commands from the hub are encoded and published.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Static broker settings and defaults
//! ├── backoff.rs          - Reconnect delay policy
//! ├── error.rs            - Transport and bridge error types
//! ├── transport.rs        - Transport/Session seam and the rumqttc implementation
//! ├── credentials.rs      - Access token refresh
//! ├── payload.rs          - Control payload construction
//! ├── message_manager.rs  - Inbound messages and topic dispatch
//! ├── publisher.rs        - Session slot and outbound commands
//! └── mqtt_handler.rs     - Connection state machine
//! ```
//!
//! ## Data Flow
//!
//! ```text
//!   broker ──► Session::next_message ──► DispatchTable ──► device handler
//!   device ──► Publisher ──► payload builder ──► SessionSlot ──► Session::publish
//! ```
//!
//! The receive loop and any number of publishers share the same session. On reconnect
//! the manager swaps the session in the slot as a whole, so a publisher sees either the
//! old session, the new one, or none, never a half-built one.

pub mod backoff;
pub mod config;
pub mod credentials;
pub mod error;
pub mod message_manager;
pub mod mqtt_handler;
pub mod payload;
pub mod publisher;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DecodeFailurePolicy, MqttConfig};
pub use credentials::{CredentialSource, FileCredentialSource};
pub use error::{BridgeError, TransportError};
pub use message_manager::{DispatchTable, InboundMessage};
pub use mqtt_handler::{ConnectionManager, ConnectionState};
pub use payload::Payload;
pub use publisher::{Publisher, SessionSlot};
pub use transport::{RumqttcTransport, Session, SessionParams, Transport, TrustRoots};

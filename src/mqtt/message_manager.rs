//! Inbound message representation and topic routing.

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::error::BridgeError;
use super::payload::Payload;

/// A message as received from the broker, before decoding.
#[derive(Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: NaiveDateTime,
}

impl InboundMessage {
    pub fn from_topic(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
            received_at: chrono::Local::now().naive_local(),
        }
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("topic", &self.topic)
            .field("payload", &String::from_utf8_lossy(&self.payload))
            .field("received_at", &self.received_at)
            .finish()
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let content = String::from_utf8_lossy(&self.payload);
        let preview: String = content.chars().take(64).collect();
        write!(f, "{} - {}: {}", self.received_at, self.topic, preview)
    }
}

/// Callback invoked with the decoded payload of a message.
pub type Handler<P> = Arc<dyn Fn(P) + Send + Sync>;

/// Routes inbound messages to per-device callbacks by exact topic.
///
/// Cloning yields another handle to the same table, so devices can register and
/// deregister while the receive loop is dispatching.
pub struct DispatchTable<P = Payload> {
    handlers: Arc<RwLock<HashMap<String, Handler<P>>>>,
}

impl<P> Clone for DispatchTable<P> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<P> Default for DispatchTable<P> {
    fn default() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<P> fmt::Debug for DispatchTable<P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DispatchTable").finish_non_exhaustive()
    }
}

impl<P: DeserializeOwned> DispatchTable<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `callback` for `topic`, replacing any earlier registration.
    pub async fn register<F>(&self, topic: impl Into<String>, callback: F)
    where
        F: Fn(P) + Send + Sync + 'static,
    {
        let topic = topic.into();
        debug!("Registering handler for {}", topic);
        self.handlers.write().await.insert(topic, Arc::new(callback));
    }

    pub async fn remove(&self, topic: &str) {
        if self.handlers.write().await.remove(topic).is_some() {
            debug!("Removed handler for {}", topic);
        }
    }

    pub async fn contains(&self, topic: &str) -> bool {
        self.handlers.read().await.contains_key(topic)
    }

    pub async fn len(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }

    pub async fn topics(&self) -> Vec<String> {
        self.handlers.read().await.keys().cloned().collect()
    }

    /// Decodes `raw` and hands it to the handler registered for `topic`.
    ///
    /// Returns `Ok(false)` when nothing is registered for the topic; the payload is not
    /// inspected in that case.
    pub async fn dispatch(&self, topic: &str, raw: &[u8]) -> Result<bool, BridgeError> {
        // The lock is released before the callback runs so it may touch the table.
        let handler = match self.handlers.read().await.get(topic) {
            Some(handler) => handler.clone(),
            None => {
                debug!("No handler for {}, dropping message", topic);
                return Ok(false);
            }
        };

        let decoded: P = serde_json::from_slice(raw).map_err(|source| BridgeError::Decode {
            topic: topic.to_string(),
            source,
        })?;
        handler(decoded);
        Ok(true)
    }

    pub async fn dispatch_message(&self, message: &InboundMessage) -> Result<bool, BridgeError> {
        self.dispatch(&message.topic, &message.payload).await
    }
}

//! Outbound device commands.
//!
//! The [`Publisher`] never owns a session. It reads the current one from the
//! [`SessionSlot`] that the connection manager swaps on every (re)connect, so a
//! publisher handed out before the first connect keeps working across reconnects.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::error::BridgeError;
use super::payload::{build_payload, Payload};
use super::transport::Session;
use crate::device::{Command, FanMode, HvacMode, PowerMode, PresetMode, SwingMode};

/// Shared indirection to the live session. Replaced wholesale, never mutated in place.
#[derive(Clone, Default)]
pub struct SessionSlot {
    current: Arc<RwLock<Option<Arc<dyn Session>>>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<Arc<dyn Session>> {
        self.current.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Installs `session`, returning the one it replaced.
    pub async fn install(&self, session: Arc<dyn Session>) -> Option<Arc<dyn Session>> {
        self.current.write().await.replace(session)
    }

    pub async fn clear(&self) -> Option<Arc<dyn Session>> {
        self.current.write().await.take()
    }
}

#[derive(Clone)]
pub struct Publisher {
    slot: SessionSlot,
}

impl Publisher {
    pub fn new(slot: SessionSlot) -> Self {
        Self { slot }
    }

    /// Builds the payload for `command` and publishes it to `topic`.
    ///
    /// Fails with [`BridgeError::NotConnected`] while no session is established; nothing
    /// is queued for later.
    pub async fn publish(&self, topic: &str, command: &Command) -> Result<(), BridgeError> {
        self.publish_payload(topic, &build_payload(command)).await
    }

    pub async fn publish_payload(&self, topic: &str, payload: &Payload) -> Result<(), BridgeError> {
        // Clone the Arc out so the slot lock is not held across the publish.
        let session = self.slot.current().await.ok_or(BridgeError::NotConnected)?;
        let body = serde_json::to_vec(payload).map_err(BridgeError::Encode)?;
        debug!("Publishing to {}: {}", topic, String::from_utf8_lossy(&body));
        session.publish(topic, body).await?;
        Ok(())
    }

    pub async fn set_power(&self, topic: &str, power: PowerMode) -> Result<(), BridgeError> {
        self.publish(topic, &Command::Power(power)).await
    }

    pub async fn set_temperature(&self, topic: &str, temperature: f32) -> Result<(), BridgeError> {
        self.publish(topic, &Command::Temperature(temperature)).await
    }

    pub async fn set_hvac_mode(&self, topic: &str, mode: HvacMode) -> Result<(), BridgeError> {
        self.publish(topic, &Command::HvacMode(mode)).await
    }

    pub async fn set_fan_mode(&self, topic: &str, mode: FanMode) -> Result<(), BridgeError> {
        self.publish(topic, &Command::FanMode(mode)).await
    }

    pub async fn set_preset_mode(&self, topic: &str, mode: PresetMode) -> Result<(), BridgeError> {
        self.publish(topic, &Command::PresetMode(mode)).await
    }

    pub async fn set_swing_mode(&self, topic: &str, mode: SwingMode) -> Result<(), BridgeError> {
        self.publish(topic, &Command::SwingMode(mode)).await
    }
}

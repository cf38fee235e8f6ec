//! Bridge between the MirAIe air-conditioner cloud and a home-automation hub.
//!
//! The [`mqtt::ConnectionManager`] holds the broker session, routes device status to
//! registered handlers and hands out [`mqtt::Publisher`]s for sending control commands.

pub mod config;
pub mod device;
pub mod mqtt;

//! Broker transport seam.
//!
//! The connection manager only talks to the broker through [`Transport`] and
//! [`Session`]. [`RumqttcTransport`] is the production implementation; tests plug in an
//! in-memory one.

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::error::TransportError;
use super::message_manager::InboundMessage;

/// How long `close` keeps driving the event loop to flush DISCONNECT.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Certificates used to validate the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustRoots {
    /// The platform trust store.
    Platform,
    /// A PEM bundle of CA certificates.
    CaBundle(PathBuf),
}

/// Everything needed to open one session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub token: String,
    /// `None` connects over plain TCP.
    pub tls: Option<TrustRoots>,
    pub keep_alive: Duration,
    /// Pending request capacity of the client queue.
    pub request_capacity: usize,
}

impl fmt::Debug for SessionParams {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SessionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .field("tls", &self.tls)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

/// Opens sessions against a broker.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connects and authenticates. Returns once the broker accepted the session.
    async fn open(&self, params: &SessionParams) -> Result<Arc<dyn Session>, TransportError>;
}

/// One live broker connection.
///
/// `publish` may be called from any task while the receive loop is waiting in
/// `next_message`.
#[async_trait]
pub trait Session: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Waits for the next application message.
    async fn next_message(&self) -> Result<InboundMessage, TransportError>;

    async fn close(&self);
}

/// [`Transport`] backed by `rumqttc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RumqttcTransport;

#[async_trait]
impl Transport for RumqttcTransport {
    async fn open(&self, params: &SessionParams) -> Result<Arc<dyn Session>, TransportError> {
        let mut options = MqttOptions::new(params.client_id.clone(), params.host.clone(), params.port);
        options
            .set_credentials(params.username.clone(), params.token.clone())
            .set_keep_alive(params.keep_alive)
            .set_clean_session(true);

        if let Some(roots) = &params.tls {
            options.set_transport(build_tls_transport(roots).await?);
        }

        let (client, mut event_loop) = AsyncClient::new(options, params.request_capacity);

        // The event loop connects lazily on its first poll.
        loop {
            if let Event::Incoming(Packet::ConnAck(ack)) = event_loop.poll().await? {
                if ack.code != ConnectReturnCode::Success {
                    return Err(TransportError::Refused(ack.code));
                }
                break;
            }
        }
        info!(
            "Connected to {}:{} as {}",
            params.host, params.port, params.client_id
        );

        Ok(Arc::new(RumqttcSession {
            client,
            event_loop: Mutex::new(event_loop),
        }))
    }
}

async fn build_tls_transport(roots: &TrustRoots) -> Result<rumqttc::Transport, TransportError> {
    match roots {
        TrustRoots::Platform => Ok(rumqttc::Transport::tls_with_default_config()),
        TrustRoots::CaBundle(path) => {
            let ca = tokio::fs::read(path).await.map_err(|e| {
                TransportError::Tls(format!(
                    "Failed to read CA bundle {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Ok(rumqttc::Transport::tls(ca, None, None))
        }
    }
}

/// Publishing goes through the cloneable client; only the receive loop polls the event
/// loop, so the two never wait on each other.
struct RumqttcSession {
    client: AsyncClient,
    event_loop: Mutex<EventLoop>,
}

#[async_trait]
impl Session for RumqttcSession {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.client.subscribe(topic, QoS::AtMostOnce).await?;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }

    async fn next_message(&self) -> Result<InboundMessage, TransportError> {
        let mut event_loop = self.event_loop.lock().await;
        loop {
            match event_loop.poll().await? {
                Event::Incoming(Packet::Publish(publish)) => {
                    return Ok(InboundMessage::from_topic(
                        publish.topic,
                        publish.payload.to_vec(),
                    ));
                }
                Event::Incoming(Packet::Disconnect) => {
                    return Err(TransportError::Closed("broker sent DISCONNECT".into()));
                }
                _ => {}
            }
        }
    }

    async fn close(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("Disconnect request not delivered: {}", e);
            return;
        }

        // The request only sits in the client queue until the event loop writes it.
        let flush = async {
            let mut event_loop = self.event_loop.lock().await;
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("Event loop ended before DISCONNECT: {}", e);
                        break;
                    }
                }
            }
        };
        if tokio::time::timeout(CLOSE_TIMEOUT, flush).await.is_err() {
            debug!("DISCONNECT not flushed within {:?}", CLOSE_TIMEOUT);
        }
    }
}

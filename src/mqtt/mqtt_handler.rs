//! Broker connection lifecycle.
//!
//! One [`ConnectionManager`] owns the single session to the MirAIe broker. Each pass
//! through the lifecycle is a [`BrokerLink`] moving through its states:
//!
//! ```text
//! Idle ──open──► Connected ──subscribe──► Subscribed ──consume──► Broken
//!  ▲                 │                                              │
//!  │                 └──────────────(open/subscribe failed)─────────┤
//!  └──────────── recover: close session, refresh token, wait ◄──────┘
//! ```
//!
//! Publishers never see the link. They go through the [`SessionSlot`], which holds the
//! session only while the link is `Subscribed`.

use statum::{machine, state};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::config::{DecodeFailurePolicy, MqttConfig};
use super::credentials::CredentialSource;
use super::error::{BridgeError, TransportError};
use super::message_manager::DispatchTable;
use super::payload::Payload;
use super::publisher::{Publisher, SessionSlot};
use super::transport::{RumqttcTransport, Session, SessionParams, Transport};

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting {
        attempt: u32,
        delay: Duration,
    },
    Failed(String),
}

#[state]
#[derive(Debug, Clone)]
pub enum LinkState {
    Idle,       // Parameters ready, no session
    Connected,  // Session open, nothing subscribed yet
    Subscribed, // Receiving messages
    Broken,     // Session failed, waiting for recovery
}

#[machine]
pub struct BrokerLink<S: LinkState> {
    params: SessionParams,
    session: Option<Arc<dyn Session>>,
    failure: Option<BridgeError>,
}

impl<S: LinkState> BrokerLink<S> {
    pub fn params(&self) -> &SessionParams {
        &self.params
    }
}

impl BrokerLink<Idle> {
    pub fn prepare(params: SessionParams) -> Self {
        Self::new(params, None, None)
    }

    /// Substitutes the access token used by the next `open`.
    pub fn with_token(mut self, token: String) -> Self {
        self.params.token = token;
        self
    }

    pub async fn open(
        mut self,
        transport: &dyn Transport,
    ) -> Result<BrokerLink<Connected>, BrokerLink<Broken>> {
        info!(
            "Connecting to {}:{} as {}",
            self.params.host, self.params.port, self.params.username
        );
        match transport.open(&self.params).await {
            Ok(session) => {
                self.session = Some(session);
                Ok(self.transition())
            }
            Err(e) => {
                self.failure = Some(e.into());
                Err(self.transition())
            }
        }
    }
}

impl BrokerLink<Connected> {
    pub fn session(&self) -> Option<Arc<dyn Session>> {
        self.session.clone()
    }

    pub async fn subscribe_all(
        mut self,
        topics: &[String],
    ) -> Result<BrokerLink<Subscribed>, BrokerLink<Broken>> {
        let Some(session) = self.session.clone() else {
            self.failure = Some(TransportError::Closed("no session to subscribe on".into()).into());
            return Err(self.transition());
        };

        for topic in topics {
            info!("Subscribing to topic: {}", topic);
            if let Err(e) = session.subscribe(topic).await {
                self.failure = Some(e.into());
                return Err(self.transition());
            }
        }
        Ok(self.transition())
    }
}

impl BrokerLink<Subscribed> {
    pub fn session(&self) -> Option<Arc<dyn Session>> {
        self.session.clone()
    }

    /// Runs the receive loop until the session fails.
    ///
    /// Messages are dispatched one at a time, in the order the transport delivers them.
    pub async fn consume<P>(
        mut self,
        dispatch: &DispatchTable<P>,
        decode_failure: DecodeFailurePolicy,
    ) -> BrokerLink<Broken>
    where
        P: serde::de::DeserializeOwned,
    {
        let Some(session) = self.session.clone() else {
            self.failure = Some(TransportError::Closed("no session to consume from".into()).into());
            return self.transition();
        };

        loop {
            let message = match session.next_message().await {
                Ok(message) => message,
                Err(e) => {
                    self.failure = Some(e.into());
                    return self.transition();
                }
            };
            debug!("Received {}", message);

            if let Err(e) = dispatch.dispatch_message(&message).await {
                match decode_failure {
                    DecodeFailurePolicy::Skip => {
                        warn!("Dropping message: {}", e);
                    }
                    DecodeFailurePolicy::Reconnect => {
                        self.failure = Some(e);
                        return self.transition();
                    }
                }
            }
        }
    }
}

impl BrokerLink<Broken> {
    /// Closes whatever is left of the session and returns the failure that broke it.
    pub async fn recover(mut self) -> (BridgeError, BrokerLink<Idle>) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        let failure = self
            .failure
            .take()
            .unwrap_or_else(|| TransportError::Closed("session ended".into()).into());
        (failure, self.transition())
    }
}

/// Owns the broker session and keeps it alive.
pub struct ConnectionManager<P = Payload> {
    config: MqttConfig,
    transport: Arc<dyn Transport>,
    dispatch: DispatchTable<P>,
    slot: SessionSlot,
    /// Opened but not yet subscribed; publishers must not see it, shutdown must close it.
    pending: Mutex<Option<Arc<dyn Session>>>,
    running: AtomicBool,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

/// Marks a manager as running for as long as `connect` holds it.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<P> ConnectionManager<P>
where
    P: serde::de::DeserializeOwned + Send + 'static,
{
    pub fn new(config: MqttConfig, transport: Arc<dyn Transport>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            transport,
            dispatch: DispatchTable::new(),
            slot: SessionSlot::new(),
            pending: Mutex::new(None),
            running: AtomicBool::new(false),
            state_tx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_rumqttc(config: MqttConfig) -> Self {
        Self::new(config, Arc::new(RumqttcTransport))
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    /// Handle to the routing table; registrations survive reconnects.
    pub fn dispatch(&self) -> DispatchTable<P> {
        self.dispatch.clone()
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.slot.clone())
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops `connect` at its next suspension point.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Connects and keeps reconnecting until cancelled.
    ///
    /// After every failure the credential source is asked for a new token exactly once,
    /// then the manager waits the configured delay and starts over. Returns `Ok(())`
    /// after [`shutdown`](Self::shutdown) and an error only when the retry policy
    /// gives up.
    ///
    /// Only one `connect` may run per manager; a concurrent call fails with
    /// [`BridgeError::AlreadyRunning`] without opening a session.
    pub async fn connect(
        &self,
        username: &str,
        initial_token: String,
        credentials: &dyn CredentialSource,
    ) -> Result<(), BridgeError> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            warn!("Connection manager is already running");
            return Err(BridgeError::AlreadyRunning);
        };
        let mut backoff = Backoff::new(self.config.retry.clone());
        let mut link = BrokerLink::prepare(self.config.session_params(username, &initial_token));

        loop {
            let current_token = link.params().token.clone();
            let broken = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.close_current().await;
                    return Ok(());
                }
                broken = self.run_session(link, &mut backoff) => broken,
            };

            self.slot.clear().await;
            self.take_pending();
            let (failure, idle) = broken.recover().await;

            let delay = match backoff.next_sleep() {
                Ok(delay) => delay,
                Err(e) => {
                    error!("Giving up after error \"{}\": {}", failure, e);
                    self.set_state(ConnectionState::Failed(failure.to_string()));
                    return Err(e.into());
                }
            };
            self.set_state(ConnectionState::Reconnecting {
                attempt: backoff.attempt(),
                delay,
            });
            warn!(
                "Error \"{}\". Reconnecting in {:.1} seconds.",
                failure,
                delay.as_secs_f64()
            );

            let token = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.close_current().await;
                    return Ok(());
                }
                refreshed = credentials.refresh() => match refreshed {
                    Ok(token) => {
                        debug!("Access token refreshed");
                        token
                    }
                    Err(e) => {
                        warn!("Token refresh failed, keeping the previous token: {}", e);
                        current_token
                    }
                },
            };

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.close_current().await;
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }

            link = idle.with_token(token);
        }
    }

    /// One pass from `Idle` to `Broken`. Publishes the session while subscribed.
    async fn run_session(&self, link: BrokerLink<Idle>, backoff: &mut Backoff) -> BrokerLink<Broken> {
        self.set_state(ConnectionState::Connecting);

        let connected = match link.open(self.transport.as_ref()).await {
            Ok(connected) => connected,
            Err(broken) => return broken,
        };
        self.set_pending(connected.session());
        let subscribed = match connected.subscribe_all(&self.config.subbed_topics).await {
            Ok(subscribed) => subscribed,
            Err(broken) => return broken,
        };

        if let Some(session) = subscribed.session() {
            self.slot.install(session).await;
        }
        self.take_pending();
        backoff.reset();
        self.set_state(ConnectionState::Connected);
        info!(
            "Listening on {} topic(s)",
            self.config.subbed_topics.len()
        );

        subscribed
            .consume(&self.dispatch, self.config.decode_failure)
            .await
    }

    // Never held across an await, so a cancelled `run_session` cannot lose the handle.
    fn set_pending(&self, session: Option<Arc<dyn Session>>) {
        *self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }

    fn take_pending(&self) -> Option<Arc<dyn Session>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    async fn close_current(&self) {
        info!("Shutting down broker connection");
        if let Some(session) = self.slot.clear().await {
            session.close().await;
        }
        if let Some(session) = self.take_pending() {
            session.close().await;
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

//! In-memory broker used by the unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use super::error::TransportError;
use super::message_manager::InboundMessage;
use super::transport::{Session, SessionParams, Transport};

type Inbound = Result<InboundMessage, TransportError>;

pub struct MockTransport {
    open_failures: Mutex<VecDeque<String>>,
    always_fail: AtomicBool,
    stall_subscribe: AtomicBool,
    opened: Mutex<Vec<SessionParams>>,
    sessions_tx: mpsc::UnboundedSender<Arc<MockSession>>,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Arc<MockSession>>) {
        let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            open_failures: Mutex::new(VecDeque::new()),
            always_fail: AtomicBool::new(false),
            stall_subscribe: AtomicBool::new(false),
            opened: Mutex::new(Vec::new()),
            sessions_tx,
        });
        (transport, sessions_rx)
    }

    /// The next `open` fails with `reason`.
    pub fn fail_next_open(&self, reason: &str) {
        self.open_failures.lock().unwrap().push_back(reason.to_string());
    }

    pub fn fail_every_open(&self) {
        self.always_fail.store(true, Ordering::SeqCst);
    }

    /// Sessions opened from now on never finish a `subscribe`.
    pub fn stall_subscriptions(&self) {
        self.stall_subscribe.store(true, Ordering::SeqCst);
    }

    /// Parameters of every `open` call, failed ones included.
    pub fn opened(&self) -> Vec<SessionParams> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, params: &SessionParams) -> Result<Arc<dyn Session>, TransportError> {
        self.opened.lock().unwrap().push(params.clone());
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(TransportError::Closed("broker unreachable".into()));
        }
        if let Some(reason) = self.open_failures.lock().unwrap().pop_front() {
            return Err(TransportError::Closed(reason));
        }
        let session = MockSession::new();
        session
            .stall_subscribe
            .store(self.stall_subscribe.load(Ordering::SeqCst), Ordering::SeqCst);
        let _ = self.sessions_tx.send(session.clone());
        Ok(session)
    }
}

pub struct MockSession {
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    subscriptions: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    closed: AtomicBool,
    stall_subscribe: AtomicBool,
}

impl MockSession {
    pub fn new() -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            subscriptions: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            stall_subscribe: AtomicBool::new(false),
        })
    }

    pub fn inject(&self, topic: &str, payload: &[u8]) {
        let _ = self
            .inbound_tx
            .send(Ok(InboundMessage::from_topic(topic, payload)));
    }

    /// Makes the pending `next_message` fail like a dropped connection.
    pub fn break_connection(&self, reason: &str) {
        let _ = self
            .inbound_tx
            .send(Err(TransportError::Closed(reason.to_string())));
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for MockSession {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.subscriptions.lock().unwrap().push(topic.to_string());
        if self.stall_subscribe.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed("session closed".into()));
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn next_message(&self) -> Result<InboundMessage, TransportError> {
        match self.inbound_rx.lock().await.recv().await {
            Some(next) => next,
            None => Err(TransportError::Closed("inbound channel dropped".into())),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Fails the test instead of hanging when `future` does not finish in time.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

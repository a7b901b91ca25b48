//! In-memory broker
//!
//! Test double for the transport: records subscribe / unsubscribe / send
//! operations, injects inbound messages on a destination, and can simulate
//! connect failures and connection drops.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::instrument;

use crate::client::{
    BrokerEvent, BrokerSession, Connection, Connector, InboundMessage, SessionOptions,
    SubscriptionId,
};
use crate::error::{BrokerError, Result};

/// Mock broker configuration
#[derive(Debug, Default, Clone)]
pub struct MockConfig {
    /// Every connect attempt fails
    pub fail_all_connects: bool,
    /// The first N connect attempts fail
    pub fail_first_connects: u32,
}

/// Operation recorded by the mock, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    Connect { endpoint: String },
    Subscribe { id: SubscriptionId, destination: String },
    Unsubscribe { id: SubscriptionId },
    Send { destination: String, body: String },
    Disconnect,
}

/// Message captured from `send`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub destination: String,
    pub body: String,
}

#[derive(Debug, Default)]
struct MockState {
    connect_attempts: u32,
    /// Bumped on every successful connect; sessions of older epochs are dead
    epoch: u64,
    connected: bool,
    events: Option<mpsc::Sender<BrokerEvent>>,
    subscriptions: BTreeMap<SubscriptionId, String>,
    operations: Vec<MockOperation>,
}

/// Mock broker. Clones share state, so a test keeps one clone and hands
/// another to the stream under test.
#[derive(Debug, Clone, Default)]
pub struct MockBroker {
    config: MockConfig,
    state: Arc<Mutex<MockState>>,
}

impl MockBroker {
    /// Create default mock broker
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    /// Create mock broker with failure injection
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            state: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `body` to every active subscription on `destination`.
    ///
    /// Returns the number of subscriptions the message was delivered to.
    pub fn inject(&self, destination: &str, body: impl Into<Bytes>) -> usize {
        let body = body.into();
        let state = self.lock();
        let Some(events) = state.events.as_ref().filter(|_| state.connected) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, dest) in state.subscriptions.iter() {
            if dest != destination {
                continue;
            }
            let event = BrokerEvent::Message(InboundMessage {
                subscription: *id,
                destination: dest.clone(),
                body: body.clone(),
            });
            if events.try_send(event).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver a MESSAGE frame for `subscription` whether or not it is still
    /// active, like a frame the broker sent before processing an UNSUBSCRIBE.
    pub fn inject_on(
        &self,
        subscription: SubscriptionId,
        destination: &str,
        body: impl Into<Bytes>,
    ) -> bool {
        let state = self.lock();
        let Some(events) = state.events.as_ref().filter(|_| state.connected) else {
            return false;
        };
        events
            .try_send(BrokerEvent::Message(InboundMessage {
                subscription,
                destination: destination.to_string(),
                body: body.into(),
            }))
            .is_ok()
    }

    /// Inject a JSON value
    pub fn inject_json(&self, destination: &str, value: &serde_json::Value) -> usize {
        self.inject(destination, Bytes::from(value.to_string()))
    }

    /// Simulate a broker-side ERROR frame
    pub fn inject_error(&self, message: &str) -> bool {
        let state = self.lock();
        state
            .events
            .as_ref()
            .map(|tx| {
                tx.try_send(BrokerEvent::Error {
                    message: message.to_string(),
                })
                .is_ok()
            })
            .unwrap_or(false)
    }

    /// Simulate a transport-level close
    pub fn drop_connection(&self) {
        let mut state = self.lock();
        if !state.connected {
            return;
        }
        state.connected = false;
        state.subscriptions.clear();
        if let Some(events) = state.events.take() {
            let _ = events.try_send(BrokerEvent::Closed {
                reason: "mock connection dropped".to_string(),
            });
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    /// Destinations with an active subscription, sorted by subscription id
    pub fn active_subscriptions(&self) -> Vec<(SubscriptionId, String)> {
        self.lock()
            .subscriptions
            .iter()
            .map(|(id, dest)| (*id, dest.clone()))
            .collect()
    }

    pub fn active_destinations(&self) -> Vec<String> {
        let mut destinations: Vec<String> =
            self.lock().subscriptions.values().cloned().collect();
        destinations.sort();
        destinations
    }

    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    /// Messages passed to `send`, in order
    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock()
            .operations
            .iter()
            .filter_map(|op| match op {
                MockOperation::Send { destination, body } => Some(SentMessage {
                    destination: destination.clone(),
                    body: body.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

impl Connector for MockBroker {
    #[instrument(name = "mock_broker_connect", skip(self, options), fields(endpoint = %endpoint))]
    async fn connect(&self, endpoint: &str, options: &SessionOptions) -> Result<Connection> {
        let mut state = self.lock();
        state.connect_attempts += 1;
        state.operations.push(MockOperation::Connect {
            endpoint: endpoint.to_string(),
        });

        if self.config.fail_all_connects || state.connect_attempts <= self.config.fail_first_connects
        {
            return Err(BrokerError::connect_failed(endpoint, "mock failure"));
        }

        let (tx, rx) = mpsc::channel(options.event_buffer.max(1));
        state.epoch += 1;
        state.connected = true;
        state.events = Some(tx);
        state.subscriptions.clear();

        let session = MockSession {
            epoch: state.epoch,
            next_subscription: Mutex::new(0),
            broker: self.clone(),
        };

        Ok(Connection {
            session: Arc::new(session),
            events: rx,
        })
    }
}

/// Session bound to one connect epoch of a `MockBroker`
struct MockSession {
    epoch: u64,
    next_subscription: Mutex<u64>,
    broker: MockBroker,
}

impl MockSession {
    fn live_state(&self) -> Result<MutexGuard<'_, MockState>> {
        let state = self.broker.lock();
        if state.connected && state.epoch == self.epoch {
            Ok(state)
        } else {
            Err(BrokerError::NotConnected)
        }
    }
}

impl BrokerSession for MockSession {
    fn subscribe(&self, destination: &str) -> Result<SubscriptionId> {
        let mut state = self.live_state()?;
        let mut next = self
            .next_subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let id = SubscriptionId(*next);
        *next += 1;

        state.subscriptions.insert(id, destination.to_string());
        state.operations.push(MockOperation::Subscribe {
            id,
            destination: destination.to_string(),
        });
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let mut state = self.live_state()?;
        state.subscriptions.remove(&id);
        state.operations.push(MockOperation::Unsubscribe { id });
        Ok(())
    }

    fn send(&self, destination: &str, body: Bytes) -> Result<()> {
        let mut state = self.live_state()?;
        state.operations.push(MockOperation::Send {
            destination: destination.to_string(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.live_state().is_ok()
    }

    fn disconnect(&self) {
        let Ok(mut state) = self.live_state() else {
            return;
        };
        state.connected = false;
        state.events = None;
        state.subscriptions.clear();
        state.operations.push(MockOperation::Disconnect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect(broker: &MockBroker) -> Connection {
        broker
            .connect("ws://mock/ws", &SessionOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_and_inject() {
        let broker = MockBroker::new();
        let mut conn = connect(&broker).await;

        let a = conn.session.subscribe("/topic/vehicle/A").unwrap();
        let b = conn.session.subscribe("/topic/vehicle/B").unwrap();
        assert_eq!(a, SubscriptionId(0));
        assert_eq!(b, SubscriptionId(1));

        assert_eq!(broker.inject("/topic/vehicle/B", "{}"), 1);
        assert_eq!(broker.inject("/topic/vehicle/C", "{}"), 0);

        match conn.events.recv().await.unwrap() {
            BrokerEvent::Message(msg) => {
                assert_eq!(msg.subscription, b);
                assert_eq!(msg.destination, "/topic/vehicle/B");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let broker = MockBroker::new();
        let conn = connect(&broker).await;

        let id = conn.session.subscribe("/topic/vehicle/A").unwrap();
        conn.session.unsubscribe(id).unwrap();
        assert_eq!(broker.inject("/topic/vehicle/A", "{}"), 0);
        assert!(broker.active_subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_connect_failures() {
        let broker = MockBroker::with_config(MockConfig {
            fail_first_connects: 2,
            ..MockConfig::default()
        });
        let options = SessionOptions::default();

        assert!(broker.connect("ws://mock", &options).await.is_err());
        assert!(broker.connect("ws://mock", &options).await.is_err());
        assert!(broker.connect("ws://mock", &options).await.is_ok());
        assert_eq!(broker.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn test_disconnect_invalidates_session() {
        let broker = MockBroker::new();
        let conn = connect(&broker).await;
        conn.session.subscribe("/topic/vehicle/A").unwrap();

        conn.session.disconnect();
        assert!(!conn.session.is_connected());
        assert!(conn.session.subscribe("/topic/vehicle/B").is_err());
        assert_eq!(broker.inject("/topic/vehicle/A", "{}"), 0);
        assert_eq!(broker.operations().last(), Some(&MockOperation::Disconnect));
    }

    #[tokio::test]
    async fn test_drop_connection_emits_closed() {
        let broker = MockBroker::new();
        let mut conn = connect(&broker).await;

        broker.drop_connection();
        assert!(matches!(
            conn.events.recv().await,
            Some(BrokerEvent::Closed { .. })
        ));
        assert!(conn.events.recv().await.is_none());
        assert!(conn.session.send("/app/telemetry", Bytes::new()).is_err());
    }

    #[tokio::test]
    async fn test_stale_session_cannot_touch_new_epoch() {
        let broker = MockBroker::new();
        let old = connect(&broker).await;
        broker.drop_connection();
        let new = connect(&broker).await;

        assert!(old.session.subscribe("/topic/x").is_err());
        assert!(new.session.subscribe("/topic/x").is_ok());
        old.session.disconnect();
        assert!(new.session.is_connected());
    }
}

//! Transport connector abstraction
//!
//! Defines the seam between the stream manager and the broker transport,
//! supporting the real WebSocket connector and the in-memory mock.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::debug::DebugSink;
use crate::error::Result;

/// Session-allocated subscription id, rendered `sub-<n>` on the wire.
///
/// Monotonic within a session and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    /// Parse the wire form `sub-<n>`
    pub fn parse(s: &str) -> Option<Self> {
        s.strip_prefix("sub-")?.parse().ok().map(Self)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Inbound application message
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub subscription: SubscriptionId,
    pub destination: String,
    pub body: Bytes,
}

/// Events delivered from the transport to its owner, in arrival order
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    Message(InboundMessage),
    /// ERROR frame received mid-session
    Error { message: String },
    /// Transport closed by the remote side or failed. Last event of a session.
    Closed { reason: String },
}

/// Options for opening a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Requested heart-beat in both directions, 0 disables
    pub heartbeat_ms: u64,
    pub connect_timeout_ms: u64,
    /// Capacity of the event channel
    pub event_buffer: usize,
    pub debug: DebugSink,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            heartbeat_ms: 10_000,
            connect_timeout_ms: 10_000,
            event_buffer: 1024,
            debug: DebugSink::Off,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &contracts::BrokerConfig, debug: DebugSink) -> Self {
        Self {
            heartbeat_ms: config.heartbeat_ms,
            connect_timeout_ms: config.connect_timeout_ms,
            event_buffer: config.event_buffer.max(1),
            debug,
        }
    }
}

/// An established broker session.
///
/// All methods are non-blocking; frames are queued to the transport.
pub trait BrokerSession: Send + Sync {
    /// Subscribe to a destination, returns the allocated id
    fn subscribe(&self, destination: &str) -> Result<SubscriptionId>;

    /// Cancel a subscription. No `Message` for `id` is produced by the
    /// transport after this returns.
    fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    /// Send an application message
    fn send(&self, destination: &str, body: Bytes) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Close the session. Idempotent; no events are emitted afterwards.
    fn disconnect(&self);
}

/// Result of a successful handshake
pub struct Connection {
    pub session: Arc<dyn BrokerSession>,
    pub events: mpsc::Receiver<BrokerEvent>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.session.is_connected())
            .finish()
    }
}

/// Transport connector trait
///
/// Opens exactly one session per call; the caller owns the result.
#[trait_variant::make(Connector: Send)]
pub trait LocalConnector {
    /// Connect and complete the broker handshake
    async fn connect(&self, endpoint: &str, options: &SessionOptions) -> Result<Connection>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_id_wire_form() {
        let id = SubscriptionId(7);
        assert_eq!(id.to_string(), "sub-7");
        assert_eq!(SubscriptionId::parse("sub-7"), Some(id));
        assert_eq!(SubscriptionId::parse("7"), None);
        assert_eq!(SubscriptionId::parse("sub-x"), None);
    }
}

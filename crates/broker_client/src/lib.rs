//! # Broker Client
//!
//! Transport connector for the fleet telemetry broker.
//!
//! Responsibilities:
//! - Open one STOMP session per stream manager over WebSocket
//! - Encode/decode STOMP 1.2 frames, heart-beats included
//! - Allocate subscription ids and deliver inbound messages in order
//! - Provide an in-memory `MockBroker` with the same `Connector` seam

pub mod client;
pub mod debug;
pub mod error;
pub mod mock_client;
pub mod stomp;
pub mod ws;

pub use client::{
    BrokerEvent, BrokerSession, Connection, Connector, InboundMessage, LocalConnector,
    SessionOptions, SubscriptionId,
};
pub use debug::{DebugHook, DebugSink};
pub use error::{BrokerError, Result};
pub use mock_client::{MockBroker, MockConfig, MockOperation, SentMessage};
pub use ws::{websocket_url, WsConnector};

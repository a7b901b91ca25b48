//! Per-instance stream and broker configuration
//!
//! Every field has a serde default so a blueprint may omit whole sections.

use serde::{Deserialize, Serialize};

use crate::topic::TELEMETRY_DESTINATION;

/// Transport-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker endpoint (`http(s)://` SockJS base or `ws(s)://` URL).
    /// `None` disables the connector entirely.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Requested heartbeat interval in both directions (0 = no heartbeats)
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,

    /// Maximum wait for the broker's `CONNECTED` frame
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Capacity of the inbound event channel between transport and stream
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Outbound application destination
    #[serde(default = "default_publish_destination")]
    pub publish_destination: String,

    /// Automatic reconnect; absent means stay disconnected after a failure
    #[serde(default)]
    pub reconnect: Option<ReconnectPolicy>,
}

fn default_heartbeat_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_event_buffer() -> usize {
    1024
}

fn default_publish_destination() -> String {
    TELEMETRY_DESTINATION.to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            heartbeat_ms: default_heartbeat_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            event_buffer: default_event_buffer(),
            publish_destination: default_publish_destination(),
            reconnect: None,
        }
    }
}

impl BrokerConfig {
    /// Config pointing at `endpoint` with all other defaults
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    /// Endpoint if configured and non-blank
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

/// Exponential backoff reconnect policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor per attempt, >= 1
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Attempts before giving up and staying disconnected
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    10
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Subscription, sampling and staleness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Per-vehicle topic (true) or the shared all-vehicles topic (false)
    #[serde(default = "default_by_car")]
    pub by_car: bool,

    /// Minimum interval between accepted records per vehicle (0 = accept all)
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Maximum path length per vehicle, in `1..=MAX_PATH_LIMIT`
    #[serde(default = "default_max_path")]
    pub max_path: usize,

    /// Explicit topic, bypasses derivation (single-vehicle stream only)
    #[serde(default)]
    pub topic_override: Option<String>,

    /// Staleness window for `data_timeout_warning`
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,

    /// Publish a data request per tracked vehicle after connecting (multi-vehicle only)
    #[serde(default = "default_request_on_connect")]
    pub request_on_connect: bool,

    /// Emit protocol-level debug lines
    #[serde(default)]
    pub debug: bool,
}

/// Upper bound accepted for `StreamConfig::max_path`
pub const MAX_PATH_LIMIT: usize = 1_000_000;

fn default_by_car() -> bool {
    true
}

fn default_throttle_ms() -> u64 {
    200
}

fn default_max_path() -> usize {
    5000
}

fn default_stale_after_ms() -> u64 {
    10_000
}

fn default_request_on_connect() -> bool {
    true
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            by_car: default_by_car(),
            throttle_ms: default_throttle_ms(),
            max_path: default_max_path(),
            topic_override: None,
            stale_after_ms: default_stale_after_ms(),
            request_on_connect: default_request_on_connect(),
            debug: false,
        }
    }
}

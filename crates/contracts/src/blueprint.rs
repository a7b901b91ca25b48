//! TrackingBlueprint - Config Loader output
//!
//! Describes a complete tracking session: broker, stream policy and the
//! initial set of tracked vehicles.

use serde::{Deserialize, Serialize};

use crate::{BrokerConfig, StreamConfig, VehicleId};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete tracking session blueprint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Vehicles to track. Empty means "all vehicles" on the shared topic.
    #[serde(default)]
    pub vehicles: Vec<VehicleId>,

    /// Transport settings
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Subscription / sampling settings
    #[serde(default)]
    pub stream: StreamConfig,
}

//! Outbound data request
//!
//! Sent to the publish destination to ask the backend for a vehicle's
//! current telemetry.

use serde::{Deserialize, Serialize};

use crate::VehicleId;

/// `{ "action": "request", "carId": <id>, "timestamp": <epoch ms> }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRequest {
    pub action: String,
    pub car_id: VehicleId,
    pub timestamp: i64,
}

impl DataRequest {
    pub const ACTION: &'static str = "request";

    pub fn new(car_id: VehicleId, timestamp: i64) -> Self {
        Self {
            action: Self::ACTION.to_string(),
            car_id,
            timestamp,
        }
    }

    /// JSON body for publishing
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "action": self.action,
            "carId": self.car_id.as_str(),
            "timestamp": self.timestamp,
        })
    }
}

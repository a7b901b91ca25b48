//! Broker destination naming
//!
//! Single source of truth for topic derivation so that every crate (and the
//! backend producer) agrees on channel names.

use crate::VehicleId;

/// Prefix of per-vehicle topics: `/topic/vehicle/<vehicleId>`
pub const VEHICLE_TOPIC_PREFIX: &str = "/topic/vehicle";

/// Shared topic carrying every vehicle's telemetry
pub const ALL_VEHICLES_TOPIC: &str = "/topic/vehicles/all";

/// Fixed outbound destination for application messages
pub const TELEMETRY_DESTINATION: &str = "/app/telemetry";

/// Per-vehicle topic name
pub fn vehicle_topic(vehicle_id: &VehicleId) -> String {
    format!("{VEHICLE_TOPIC_PREFIX}/{vehicle_id}")
}

/// Resolve the topic a single-vehicle stream subscribes to.
///
/// Priority: explicit override, then per-vehicle topic (when `by_car` and an
/// id is present), then the shared all-vehicles topic.
pub fn resolve_topic(
    vehicle_id: Option<&VehicleId>,
    by_car: bool,
    topic_override: Option<&str>,
) -> String {
    if let Some(topic) = topic_override.filter(|t| !t.is_empty()) {
        return topic.to_string();
    }

    match vehicle_id {
        Some(id) if by_car => vehicle_topic(id),
        _ => ALL_VEHICLES_TOPIC.to_string(),
    }
}

//! Telemetry records - Normalizer output and stream state
//!
//! `CanonicalTelemetry` is the schema-stable form of an inbound payload,
//! `PathPoint` is its lighter projection kept in path history.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::VehicleId;

/// Normalized telemetry record.
///
/// `latitude` / `longitude` are always finite; records that fail this are
/// rejected by the normalizer and never constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTelemetry {
    /// Payload `id` field, if the producer sent one
    pub record_id: Option<String>,

    /// Payload `vehicleId`, else the id the subscription was opened for
    pub vehicle_id: VehicleId,

    pub vehicle_name: Option<String>,

    pub plate_no: Option<String>,

    /// Degrees, WGS84
    pub latitude: f64,

    /// Degrees, WGS84
    pub longitude: f64,

    /// km/h, 0 when absent
    pub speed_kmh: f64,

    /// Compass bearing in degrees; `None` means unknown, never coerced to 0
    pub heading: Option<f64>,

    pub status: Option<String>,

    pub fuel_level: Option<f64>,

    pub engine_status: Option<String>,

    /// Epoch milliseconds. Falls back to the normalization instant when the
    /// payload timestamp is absent or unparseable.
    pub timestamp_ms: i64,

    /// Whether `timestamp_ms` came from the payload (false = wall-clock substitute)
    pub timestamp_from_source: bool,

    /// Original payload, kept for diagnostics
    pub raw: Value,
}

impl CanonicalTelemetry {
    /// Project into a path point
    pub fn to_path_point(&self) -> PathPoint {
        PathPoint {
            lat: self.latitude,
            lng: self.longitude,
            timestamp_ms: self.timestamp_ms,
            speed_kmh: self.speed_kmh,
            heading: self.heading,
        }
    }

    /// Human-readable label used for map markers
    pub fn display_label(&self) -> String {
        let name = self
            .vehicle_name
            .clone()
            .unwrap_or_else(|| format!("Vehicle_{}", self.vehicle_id));
        match self.plate_no.as_deref() {
            Some(plate) if !plate.is_empty() => format!("{name} · {plate}"),
            _ => name,
        }
    }
}

/// One accepted position in a vehicle's path history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub lat: f64,
    pub lng: f64,
    pub timestamp_ms: i64,
    pub speed_kmh: f64,
    pub heading: Option<f64>,
}

/// Per-vehicle aggregate as seen by consumers.
///
/// `path` is ordered oldest -> newest and never longer than the configured
/// `max_path`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleStreamState {
    pub last_point: Option<PathPoint>,
    pub last_telemetry: Option<CanonicalTelemetry>,
    pub path: Vec<PathPoint>,
}

impl VehicleStreamState {
    /// Whether anything has been accepted since creation / last clear
    pub fn has_data(&self) -> bool {
        self.last_point.is_some()
    }
}

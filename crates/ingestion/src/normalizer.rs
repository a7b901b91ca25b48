//! Telemetry normalizer
//!
//! Turns an inbound message body into a `CanonicalTelemetry` or rejects it.
//! Rejections never mutate stream state; they are logged with the raw body
//! and counted.

use std::sync::Arc;

use contracts::{CanonicalTelemetry, VehicleId};
use serde_json::Value;
use tracing::{instrument, trace, warn};

use crate::error::{IngestionError, Result};
use crate::extract::{
    optional_f64, optional_string, resolve_coordinate, LATITUDE_CHAIN, LONGITUDE_CHAIN,
};
use crate::metrics::IngestionMetrics;
use crate::timestamp::derive_timestamp;

/// Stateless apart from its counters; one per stream manager
#[derive(Debug, Clone, Default)]
pub struct TelemetryNormalizer {
    metrics: Arc<IngestionMetrics>,
}

impl TelemetryNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share counters with another owner
    pub fn with_metrics(metrics: Arc<IngestionMetrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Arc<IngestionMetrics> {
        &self.metrics
    }

    /// Normalize a raw message body.
    ///
    /// `fallback_id` is the vehicle the subscription was opened for; it is
    /// used when the payload carries no `vehicleId` of its own.
    #[instrument(
        name = "ingestion_normalize",
        level = "trace",
        skip(self, body),
        fields(vehicle_id = %fallback_id, len = body.len())
    )]
    pub fn normalize(
        &self,
        body: &[u8],
        fallback_id: &VehicleId,
        now_ms: i64,
    ) -> Result<CanonicalTelemetry> {
        self.metrics.record_received();
        let result = parse_body(body, fallback_id)
            .and_then(|raw| build_record(raw, fallback_id, now_ms));
        self.account(result, fallback_id, body)
    }

    /// Normalize an already-parsed payload
    pub fn normalize_value(
        &self,
        raw: Value,
        fallback_id: &VehicleId,
        now_ms: i64,
    ) -> Result<CanonicalTelemetry> {
        self.metrics.record_received();
        let body = raw.to_string();
        let result = build_record(raw, fallback_id, now_ms);
        self.account(result, fallback_id, body.as_bytes())
    }

    fn account(
        &self,
        result: Result<CanonicalTelemetry>,
        fallback_id: &VehicleId,
        body: &[u8],
    ) -> Result<CanonicalTelemetry> {
        match &result {
            Ok(record) => {
                self.metrics.record_normalized(record.timestamp_from_source);
                trace!(
                    vehicle_id = %record.vehicle_id,
                    lat = record.latitude,
                    lng = record.longitude,
                    "Telemetry normalized"
                );
            }
            Err(e) => {
                self.metrics.record_rejected(e);
                ::metrics::counter!(
                    "fleet_stream_messages_rejected_total",
                    "vehicle_id" => fallback_id.to_string(),
                    "reason" => e.reason()
                )
                .increment(1);
                warn!(
                    vehicle_id = %fallback_id,
                    reason = e.reason(),
                    error = %e,
                    raw = %String::from_utf8_lossy(body),
                    "Telemetry rejected"
                );
            }
        }
        result
    }
}

fn parse_body(body: &[u8], fallback_id: &VehicleId) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(IngestionError::EmptyBody {
            vehicle_id: fallback_id.clone(),
        });
    }
    serde_json::from_slice(body).map_err(|e| IngestionError::ParseFailed {
        vehicle_id: fallback_id.clone(),
        message: e.to_string(),
    })
}

fn build_record(raw: Value, fallback_id: &VehicleId, now_ms: i64) -> Result<CanonicalTelemetry> {
    if !raw.is_object() {
        return Err(IngestionError::NotAnObject {
            vehicle_id: fallback_id.clone(),
        });
    }

    let (latitude, longitude) = match (
        resolve_coordinate(&raw, LATITUDE_CHAIN),
        resolve_coordinate(&raw, LONGITUDE_CHAIN),
    ) {
        (Ok(lat), Ok(lng)) => (lat, lng),
        (lat, lng) => {
            return Err(IngestionError::InvalidPosition {
                vehicle_id: fallback_id.clone(),
                latitude: lat.map_or_else(|e| e.to_string(), |v| v.to_string()),
                longitude: lng.map_or_else(|e| e.to_string(), |v| v.to_string()),
            })
        }
    };

    let timestamp = derive_timestamp(&raw, now_ms);
    let vehicle_id = optional_string(&raw, "vehicleId")
        .filter(|id| !id.is_empty())
        .map(VehicleId::from)
        .unwrap_or_else(|| fallback_id.clone());

    Ok(CanonicalTelemetry {
        record_id: optional_string(&raw, "id"),
        vehicle_id,
        vehicle_name: optional_string(&raw, "vehicleName"),
        plate_no: optional_string(&raw, "plateNo"),
        latitude,
        longitude,
        speed_kmh: optional_f64(&raw, "speed").unwrap_or(0.0),
        heading: optional_f64(&raw, "heading"),
        status: optional_string(&raw, "status"),
        fuel_level: optional_f64(&raw, "fuelLevel"),
        engine_status: optional_string(&raw, "engineStatus"),
        timestamp_ms: timestamp.ms,
        timestamp_from_source: timestamp.from_source,
        raw,
    })
}

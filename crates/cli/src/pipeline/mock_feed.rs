//! Synthetic telemetry for `--mock` runs.
//!
//! Each vehicle drives a circle around a fixed centre; payloads use a mix of
//! field aliases so the normalizer is exercised the same way a live broker
//! would exercise it.

use std::f64::consts::TAU;
use std::time::Duration;

use broker_client::MockBroker;
use contracts::{Clock, SystemClock, VehicleId};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::trace;

const CENTER: (f64, f64) = (37.5665, 126.9780);
const RADIUS_DEG: f64 = 0.01;
const STEPS_PER_LAP: u64 = 360;

/// Where a simulated vehicle publishes
#[derive(Debug, Clone)]
pub struct FeedTarget {
    pub destination: String,
    pub vehicle_id: VehicleId,
}

pub fn spawn(broker: MockBroker, targets: Vec<FeedTarget>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        let mut step: u64 = 0;
        loop {
            tick.tick().await;
            for (index, target) in targets.iter().enumerate() {
                let payload = sample(&target.vehicle_id, index, step, SystemClock.now_ms());
                let delivered = broker.inject_json(&target.destination, &payload);
                trace!(vehicle_id = %target.vehicle_id, delivered, "Mock telemetry injected");
            }
            step += 1;
        }
    })
}

/// Payload for vehicle number `index` at `step`
pub fn sample(vehicle_id: &VehicleId, index: usize, step: u64, now_ms: i64) -> Value {
    let phase = index as f64 * TAU / 8.0;
    let angle = phase + (step % STEPS_PER_LAP) as f64 * TAU / STEPS_PER_LAP as f64;
    let lat = CENTER.0 + RADIUS_DEG * angle.sin();
    let lng = CENTER.1 + RADIUS_DEG * angle.cos();
    let heading = (360.0 - angle.to_degrees()).rem_euclid(360.0);
    let speed = 30.0 + (index as f64 * 7.0) % 40.0;

    if index % 2 == 0 {
        json!({
            "vehicleId": vehicle_id.as_str(),
            "vehicleName": format!("Mock {}", index + 1),
            "latitude": lat,
            "longitude": lng,
            "speed": speed,
            "heading": heading,
            "timestamp": now_ms,
        })
    } else {
        json!({
            "vehicleId": vehicle_id.as_str(),
            "lat": lat.to_string(),
            "lng": lng.to_string(),
            "speed": speed,
            "ts": now_ms,
        })
    }
}

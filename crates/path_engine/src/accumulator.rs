//! Throttle & path accumulator
//!
//! Owns the per-vehicle throttle state and path windows. `accept` is a
//! single synchronous read-modify-write, so callers holding `&mut self`
//! cannot interleave two updates for the same vehicle.

use std::collections::HashMap;

use contracts::{CanonicalTelemetry, PathPoint, VehicleId};
use tracing::trace;

use crate::buffer::PathBuffer;
use crate::throttle::Throttle;

/// Outcome of `accept`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Appended to the vehicle's path
    Accepted(PathPoint),
    /// Dropped by sampling
    Throttled,
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Accumulator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccumulatorConfig {
    pub throttle_ms: u64,
    pub max_path: usize,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 200,
            max_path: 5000,
        }
    }
}

impl From<&contracts::StreamConfig> for AccumulatorConfig {
    fn from(config: &contracts::StreamConfig) -> Self {
        Self {
            throttle_ms: config.throttle_ms,
            max_path: config.max_path,
        }
    }
}

#[derive(Debug)]
pub struct PathAccumulator {
    config: AccumulatorConfig,
    throttle: Throttle,
    paths: HashMap<VehicleId, PathBuffer>,
}

impl PathAccumulator {
    pub fn new(config: AccumulatorConfig) -> Self {
        Self {
            config,
            throttle: Throttle::new(config.throttle_ms),
            paths: HashMap::new(),
        }
    }

    pub fn config(&self) -> AccumulatorConfig {
        self.config
    }

    /// Sample `record` for `vehicle_id` at arrival time `now_ms`.
    ///
    /// `vehicle_id` is the routing key (the subscription's vehicle), not the
    /// payload's self-reported id.
    pub fn accept(
        &mut self,
        vehicle_id: &VehicleId,
        record: &CanonicalTelemetry,
        now_ms: i64,
    ) -> Admission {
        if !self.throttle.admit(vehicle_id, now_ms) {
            trace!(vehicle_id = %vehicle_id, "Record throttled");
            return Admission::Throttled;
        }

        let point = record.to_path_point();
        let max_path = self.config.max_path;
        let path = self
            .paths
            .entry(vehicle_id.clone())
            .or_insert_with(|| PathBuffer::new(max_path));
        if let Some(evicted) = path.push(point) {
            trace!(
                vehicle_id = %vehicle_id,
                evicted_ts = evicted.timestamp_ms,
                "Path window full, oldest point evicted"
            );
        }
        Admission::Accepted(point)
    }

    /// Path for a vehicle, oldest first; empty if unknown
    pub fn path(&self, vehicle_id: &VehicleId) -> Vec<PathPoint> {
        self.paths
            .get(vehicle_id)
            .map(PathBuffer::to_vec)
            .unwrap_or_default()
    }

    pub fn path_len(&self, vehicle_id: &VehicleId) -> usize {
        self.paths.get(vehicle_id).map_or(0, PathBuffer::len)
    }

    pub fn last_point(&self, vehicle_id: &VehicleId) -> Option<PathPoint> {
        self.paths.get(vehicle_id).and_then(|p| p.last().copied())
    }

    /// Soft reset of one vehicle's path; throttle state is kept
    pub fn clear_path(&mut self, vehicle_id: &VehicleId) {
        self.paths.remove(vehicle_id);
    }

    /// Soft reset of every path; throttle state is kept
    pub fn clear_all(&mut self) {
        self.paths.clear();
    }

    /// Discard everything held for a vehicle that is no longer tracked
    pub fn forget(&mut self, vehicle_id: &VehicleId) {
        self.paths.remove(vehicle_id);
        self.throttle.forget(vehicle_id);
    }

    /// Vehicles with a non-empty path
    pub fn vehicles(&self) -> impl Iterator<Item = &VehicleId> + '_ {
        self.paths.keys()
    }
}

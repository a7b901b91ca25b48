//! Stream state store
//!
//! Per-vehicle last point, last telemetry and path, plus the bookkeeping
//! the staleness watchdog needs. All mutation happens under one lock held
//! for the whole read-modify-write of a record, never across an await.

use std::collections::{BTreeMap, HashMap};

use contracts::{CanonicalTelemetry, ConnectionState, PathPoint, VehicleId, VehicleStreamState};
use path_engine::{AccumulatorConfig, Admission, PathAccumulator};
use serde::Serialize;

/// Consumer-visible summary, published on every change
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamStatus {
    pub connection: ConnectionState,
    pub data_timeout_warning: bool,
    /// Subscribed topic of a single-vehicle stream
    pub topic: Option<String>,
    /// Tracked keys, sorted
    pub tracked: Vec<VehicleId>,
    /// Live subscriptions on the current session
    pub subscriptions: usize,
    /// Inbound messages processed, accepted or not
    pub messages_seen: u64,
    /// Bumped on every state change a consumer can observe
    pub revision: u64,
}

impl StreamStatus {
    pub fn connected(&self) -> bool {
        self.connection.is_connected()
    }
}

#[derive(Debug)]
pub struct StreamStore {
    accumulator: PathAccumulator,
    telemetry: HashMap<VehicleId, CanonicalTelemetry>,
    connected_at_ms: Option<i64>,
    last_accept_ms: Option<i64>,
}

impl StreamStore {
    pub fn new(config: AccumulatorConfig) -> Self {
        Self {
            accumulator: PathAccumulator::new(config),
            telemetry: HashMap::new(),
            connected_at_ms: None,
            last_accept_ms: None,
        }
    }

    /// Sample and store one record under `key`
    pub fn accept(&mut self, key: &VehicleId, record: CanonicalTelemetry, now_ms: i64) -> Admission {
        let admission = self.accumulator.accept(key, &record, now_ms);
        if admission.is_accepted() {
            self.telemetry.insert(key.clone(), record);
            self.last_accept_ms = Some(now_ms);
        }
        admission
    }

    pub fn last_point(&self, key: &VehicleId) -> Option<PathPoint> {
        self.accumulator.last_point(key)
    }

    pub fn last_telemetry(&self, key: &VehicleId) -> Option<CanonicalTelemetry> {
        self.telemetry.get(key).cloned()
    }

    pub fn path(&self, key: &VehicleId) -> Vec<PathPoint> {
        self.accumulator.path(key)
    }

    pub fn path_len(&self, key: &VehicleId) -> usize {
        self.accumulator.path_len(key)
    }

    /// Snapshot of one vehicle; `None` until its first accepted record
    pub fn vehicle(&self, key: &VehicleId) -> Option<VehicleStreamState> {
        let last_point = self.accumulator.last_point(key)?;
        Some(VehicleStreamState {
            last_point: Some(last_point),
            last_telemetry: self.telemetry.get(key).cloned(),
            path: self.accumulator.path(key),
        })
    }

    /// Snapshot of every vehicle with data, sorted by id
    pub fn vehicles(&self) -> BTreeMap<VehicleId, VehicleStreamState> {
        self.accumulator
            .vehicles()
            .filter_map(|key| self.vehicle(key).map(|state| (key.clone(), state)))
            .collect()
    }

    /// Soft reset of one vehicle; throttle state is kept
    pub fn clear(&mut self, key: &VehicleId) {
        self.accumulator.clear_path(key);
        self.telemetry.remove(key);
    }

    /// Soft reset of every vehicle; throttle state is kept
    pub fn clear_all(&mut self) {
        self.accumulator.clear_all();
        self.telemetry.clear();
    }

    /// Drop everything held for a vehicle that left the tracked set
    pub fn forget(&mut self, key: &VehicleId) {
        self.accumulator.forget(key);
        self.telemetry.remove(key);
    }

    /// Full discard on teardown
    pub fn reset(&mut self) {
        *self = Self::new(self.accumulator.config());
    }

    pub fn on_connected(&mut self, now_ms: i64) {
        self.connected_at_ms = Some(now_ms);
    }

    pub fn on_disconnected(&mut self) {
        self.connected_at_ms = None;
    }

    /// No accepted record within `stale_after_ms` of the later of connect
    /// time and last acceptance. Never stale while disconnected.
    pub fn is_stale(&self, now_ms: i64, stale_after_ms: u64) -> bool {
        let Some(connected_at) = self.connected_at_ms else {
            return false;
        };
        let reference = self
            .last_accept_ms
            .map_or(connected_at, |last| last.max(connected_at));
        now_ms.saturating_sub(reference) >= stale_after_ms as i64
    }
}

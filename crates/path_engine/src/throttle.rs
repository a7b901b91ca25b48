//! Per-vehicle sampling throttle.
//!
//! A record is admitted only if at least `interval_ms` has passed since the
//! last admitted record for the same vehicle. Rejected records are dropped,
//! never queued. The first record for a vehicle is always admitted.

use std::collections::HashMap;

use contracts::VehicleId;

#[derive(Debug, Clone, Default)]
pub struct Throttle {
    interval_ms: u64,
    last_emit: HashMap<VehicleId, i64>,
}

impl Throttle {
    /// `interval_ms = 0` admits everything
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_emit: HashMap::new(),
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Admit or drop; admission records `now_ms` as the last emit time
    pub fn admit(&mut self, vehicle_id: &VehicleId, now_ms: i64) -> bool {
        if let Some(&last) = self.last_emit.get(vehicle_id) {
            if now_ms.saturating_sub(last) < self.interval_ms as i64 {
                return false;
            }
        }
        self.last_emit.insert(vehicle_id.clone(), now_ms);
        true
    }

    /// Last admission time for a vehicle
    pub fn last_emit(&self, vehicle_id: &VehicleId) -> Option<i64> {
        self.last_emit.get(vehicle_id).copied()
    }

    /// Drop a vehicle's entry; its next record is admitted unconditionally
    pub fn forget(&mut self, vehicle_id: &VehicleId) {
        self.last_emit.remove(vehicle_id);
    }

    pub fn reset(&mut self) {
        self.last_emit.clear();
    }

    pub fn tracked(&self) -> usize {
        self.last_emit.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_record_always_admitted() {
        let mut throttle = Throttle::new(60_000);
        assert!(throttle.admit(&"veh-0001".into(), 0));
    }

    #[test]
    fn test_records_inside_interval_dropped() {
        let mut throttle = Throttle::new(100);
        let id: VehicleId = "veh-0005".into();
        assert!(throttle.admit(&id, 1_000));
        assert!(!throttle.admit(&id, 1_010));
        assert!(!throttle.admit(&id, 1_099));
        assert!(throttle.admit(&id, 1_100));
        assert_eq!(throttle.last_emit(&id), Some(1_100));
    }

    #[test]
    fn test_vehicles_throttled_independently() {
        let mut throttle = Throttle::new(100);
        assert!(throttle.admit(&"a".into(), 0));
        assert!(throttle.admit(&"b".into(), 10));
        assert!(!throttle.admit(&"a".into(), 20));
        assert_eq!(throttle.tracked(), 2);
    }

    #[test]
    fn test_zero_interval_admits_all() {
        let mut throttle = Throttle::new(0);
        let id: VehicleId = "a".into();
        for _ in 0..10 {
            assert!(throttle.admit(&id, 5));
        }
    }

    #[test]
    fn test_sampling_bound() {
        // Candidates every 7 ms over a 1000 ms span, 100 ms interval
        let mut throttle = Throttle::new(100);
        let id: VehicleId = "a".into();
        let admitted = (0..=1000)
            .step_by(7)
            .filter(|t| throttle.admit(&id, *t))
            .count();
        let span: i64 = 994;
        assert!(admitted as i64 <= (span + 99) / 100 + 1);
    }

    #[test]
    fn test_forget_resets_vehicle() {
        let mut throttle = Throttle::new(100);
        let id: VehicleId = "a".into();
        assert!(throttle.admit(&id, 0));
        throttle.forget(&id);
        assert!(throttle.admit(&id, 1));
    }
}

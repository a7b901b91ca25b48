//! Per-message stream events
//!
//! Broadcast to any number of observers (CLI statistics, map renderer).
//! Slow observers lag and lose events; the stream never waits for them.

use contracts::{ConnectionState, PathPoint, VehicleId};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connection(ConnectionState),
    /// Point appended to `vehicle_id`'s path at arrival time `at_ms`
    Accepted {
        vehicle_id: VehicleId,
        point: PathPoint,
        at_ms: i64,
    },
    Throttled {
        vehicle_id: VehicleId,
    },
    Rejected {
        vehicle_id: VehicleId,
        reason: &'static str,
    },
    /// Payload `vehicleId` disagreed with the subscription; routed to `vehicle_id`
    VehicleMismatch {
        vehicle_id: VehicleId,
        reported: VehicleId,
    },
    Published {
        success: bool,
    },
}

//! Inbound message handling
//!
//! normalize -> cross-check payload id -> throttle/accumulate -> publish
//! status. The store update for one record happens under a single lock.

use ingestion::TelemetryNormalizer;
use observability::{
    record_data_stale, record_message_received, record_point_accepted, record_point_throttled,
    record_vehicle_mismatch,
};
use path_engine::Admission;
use tracing::{instrument, trace, warn};

use crate::event::StreamEvent;
use crate::shared::Shared;
use crate::subscriptions::Route;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Outcome {
    Accepted,
    Throttled,
    Rejected,
}

#[derive(Debug, Default)]
pub(crate) struct MessageHandler {
    normalizer: TelemetryNormalizer,
}

impl MessageHandler {
    pub fn new(normalizer: TelemetryNormalizer) -> Self {
        Self { normalizer }
    }

    #[instrument(
        name = "stream_handle_message",
        level = "trace",
        skip(self, shared, body),
        fields(vehicle_id = %route.vehicle_id, topic = %route.destination)
    )]
    pub fn handle(&self, shared: &Shared, route: &Route, body: &[u8]) -> Outcome {
        let key = &route.vehicle_id;
        let now = shared.now_ms();
        record_message_received(key);

        let record = match self.normalizer.normalize(body, key, now) {
            Ok(record) => record,
            Err(e) => {
                shared.note_message();
                shared.emit(StreamEvent::Rejected {
                    vehicle_id: key.clone(),
                    reason: e.reason(),
                });
                return Outcome::Rejected;
            }
        };

        if route.verify && record.vehicle_id != *key {
            warn!(
                vehicle_id = %key,
                reported = %record.vehicle_id,
                topic = %route.destination,
                "Payload vehicleId does not match subscription, keeping topic routing"
            );
            record_vehicle_mismatch(key);
            shared.emit(StreamEvent::VehicleMismatch {
                vehicle_id: key.clone(),
                reported: record.vehicle_id.clone(),
            });
        }

        let (admission, path_len) = {
            let mut store = shared.store();
            let admission = store.accept(key, record, now);
            (admission, store.path_len(key))
        };

        match admission {
            Admission::Accepted(point) => {
                record_point_accepted(key, &point, path_len);
                let was_stale = shared.status().data_timeout_warning;
                shared.update_status(|status| {
                    status.messages_seen += 1;
                    status.data_timeout_warning = false;
                });
                if was_stale {
                    record_data_stale(false);
                }
                trace!(lat = point.lat, lng = point.lng, path_len, "Point accepted");
                shared.emit(StreamEvent::Accepted {
                    vehicle_id: key.clone(),
                    point,
                    at_ms: now,
                });
                Outcome::Accepted
            }
            Admission::Throttled => {
                record_point_throttled(key);
                shared.note_message();
                shared.emit(StreamEvent::Throttled {
                    vehicle_id: key.clone(),
                });
                Outcome::Throttled
            }
        }
    }
}

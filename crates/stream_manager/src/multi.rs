//! Multi-vehicle stream
//!
//! One connection, one per-vehicle topic subscription per tracked vehicle.
//! Changing the tracked set only touches the vehicles that changed.

use std::collections::BTreeMap;
use std::time::Duration;

use contracts::{VehicleId, VehicleStreamState};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::instrument;

use crate::error::Result;
use crate::event::StreamEvent;
use crate::handle::StreamHandle;
use crate::store::StreamStatus;
use crate::subscriptions::{SubscriptionDiff, Target};

pub struct MultiCarStream {
    handle: StreamHandle,
}

impl MultiCarStream {
    pub(crate) fn new(handle: StreamHandle) -> Self {
        Self { handle }
    }

    pub fn connected(&self) -> bool {
        self.handle.connected()
    }

    /// Replace the tracked set.
    ///
    /// Removed vehicles are unsubscribed and their state discarded; added
    /// ones are subscribed (and sent a data request when configured).
    /// While disconnected the set is remembered and applied on connect.
    #[instrument(name = "stream_set_tracked_vehicles", skip(self, vehicles))]
    pub async fn set_tracked_vehicles(
        &self,
        vehicles: impl IntoIterator<Item = VehicleId>,
    ) -> Result<SubscriptionDiff> {
        let targets = vehicles.into_iter().map(Target::vehicle).collect();
        self.handle.track(targets).await
    }

    pub fn tracked_vehicles(&self) -> Vec<VehicleId> {
        self.handle.status().tracked
    }

    /// Snapshot of every vehicle with at least one accepted point
    pub fn vehicle_data(&self) -> BTreeMap<VehicleId, VehicleStreamState> {
        self.handle.shared.store().vehicles()
    }

    pub fn vehicle(&self, vehicle_id: &VehicleId) -> Option<VehicleStreamState> {
        self.handle.shared.store().vehicle(vehicle_id)
    }

    /// No accepted record for any tracked vehicle within the staleness window
    pub fn data_timeout_warning(&self) -> bool {
        self.handle.status().data_timeout_warning
    }

    /// Soft reset of one vehicle, or of all when `vehicle_id` is `None`.
    /// Subscriptions and throttle timestamps are kept.
    pub fn clear_vehicle_data(&self, vehicle_id: Option<&VehicleId>) {
        {
            let mut store = self.handle.shared.store();
            match vehicle_id {
                Some(id) => store.clear(id),
                None => store.clear_all(),
            }
        }
        self.handle.shared.update_status(|_| {});
    }

    pub fn publish<T: Serialize + ?Sized>(&self, payload: &T) {
        self.handle.publish(payload);
    }

    pub fn status(&self) -> StreamStatus {
        self.handle.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StreamStatus> {
        self.handle.subscribe_status()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.handle.subscribe_events()
    }

    pub async fn wait_for_status(
        &self,
        predicate: impl FnMut(&StreamStatus) -> bool,
    ) -> StreamStatus {
        self.handle.wait_for_status(predicate).await
    }

    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        self.handle.wait_for_connection(timeout).await
    }

    pub async fn shutdown(&self) {
        self.handle.shutdown().await;
    }
}

//! Single-vehicle stream
//!
//! One topic, one path. Without a vehicle id (or with `by_car = false`)
//! every message on the shared topic feeds the same path.

use std::time::Duration;

use contracts::{CanonicalTelemetry, PathPoint, VehicleId};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::event::StreamEvent;
use crate::handle::StreamHandle;
use crate::store::StreamStatus;

pub struct CarStream {
    handle: StreamHandle,
    key: VehicleId,
    topic: String,
}

impl CarStream {
    pub(crate) fn new(handle: StreamHandle, key: VehicleId, topic: String) -> Self {
        Self { handle, key, topic }
    }

    pub fn connected(&self) -> bool {
        self.handle.connected()
    }

    /// Most recent accepted point
    pub fn last_point(&self) -> Option<PathPoint> {
        self.handle.shared.store().last_point(&self.key)
    }

    /// Telemetry of the most recent accepted point
    pub fn last_telemetry(&self) -> Option<CanonicalTelemetry> {
        self.handle.shared.store().last_telemetry(&self.key)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Key the stream's state is stored under
    pub fn key(&self) -> &VehicleId {
        &self.key
    }

    /// Copy of the path, oldest first
    pub fn get_path(&self) -> Vec<PathPoint> {
        self.handle.shared.store().path(&self.key)
    }

    /// Forget path and last point; connection and subscription stay up
    pub fn clear_path(&self) {
        self.handle.shared.store().clear(&self.key);
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

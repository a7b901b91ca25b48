//! State shared between a stream handle and its worker task

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use broker_client::BrokerSession;
use bytes::Bytes;
use contracts::SharedClock;
use observability::record_publish;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::event::StreamEvent;
use crate::store::{StreamStatus, StreamStore};

pub(crate) struct Shared {
    store: Mutex<StreamStore>,
    session: Mutex<Option<Arc<dyn BrokerSession>>>,
    status: watch::Sender<StreamStatus>,
    events: broadcast::Sender<StreamEvent>,
    pub clock: SharedClock,
    pub publish_destination: String,
}

impl Shared {
    pub fn new(
        store: StreamStore,
        status: StreamStatus,
        clock: SharedClock,
        publish_destination: String,
        event_buffer: usize,
    ) -> Self {
        let (status, _) = watch::channel(status);
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            store: Mutex::new(store),
            session: Mutex::new(None),
            status,
            events,
            clock,
            publish_destination,
        }
    }

    pub fn store(&self) -> MutexGuard<'_, StreamStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn session(&self) -> Option<Arc<dyn BrokerSession>> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_session(&self, session: Option<Arc<dyn BrokerSession>>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }

    pub fn status(&self) -> StreamStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StreamStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// No receivers is not an error
    pub fn emit(&self, event: StreamEvent) {
        let _ = self.events.send(event);
    }

    /// Apply a consumer-visible change and bump the revision
    pub fn update_status(&self, f: impl FnOnce(&mut StreamStatus)) {
        self.status.send_modify(|status| {
            f(status);
            status.revision += 1;
        });
    }

    /// Count a processed message without bumping the revision
    pub fn note_message(&self) {
        self.status.send_modify(|status| status.messages_seen += 1);
    }

    /// Fire-and-forget publish on the outbound destination.
    ///
    /// Disconnected or failed sends are logged and dropped, never queued.
    pub fn publish<T: Serialize + ?Sized>(&self, payload: &T) {
        let destination = self.publish_destination.as_str();
        let Some(session) = self.session().filter(|s| s.is_connected()) else {
            warn!(destination, "Publish skipped, not connected");
            self.publish_outcome(false);
            return;
        };

        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(destination, error = %e, "Publish skipped, payload not serializable");
                self.publish_outcome(false);
                return;
            }
        };

        match session.send(destination, Bytes::from(body)) {
            Ok(()) => {
                debug!(destination, "Published");
                self.publish_outcome(true);
            }
            Err(e) => {
                warn!(destination, error = %e, "Publish failed");
                self.publish_outcome(false);
            }
        }
    }

    fn publish_outcome(&self, success: bool) {
        record_publish(success);
        self.emit(StreamEvent::Published { success });
    }
}

//! StreamHandle - owner side of a running stream worker
//!
//! Dropping the handle closes the command channel, which makes the worker
//! unsubscribe, disconnect and exit.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use crate::driver::Command;
use crate::error::{Result, StreamError};
use crate::event::StreamEvent;
use crate::shared::Shared;
use crate::store::StreamStatus;
use crate::subscriptions::{SubscriptionDiff, Target};

pub struct StreamHandle {
    pub(crate) shared: Arc<Shared>,
    commands: mpsc::Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StreamHandle {
    pub(crate) fn new(
        shared: Arc<Shared>,
        commands: mpsc::Sender<Command>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            shared,
            commands,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn connected(&self) -> bool {
        self.shared.status().connected()
    }

    /// Current status snapshot
    pub fn status(&self) -> StreamStatus {
        self.shared.status()
    }

    /// Receiver notified on every status change
    pub fn subscribe_status(&self) -> watch::Receiver<StreamStatus> {
        self.shared.subscribe_status()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.shared.subscribe_events()
    }

    /// Send an application message to the publish destination.
    ///
    /// A no-op with a logged warning while disconnected.
    pub fn publish<T: Serialize + ?Sized>(&self, payload: &T) {
        self.shared.publish(payload);
    }

    /// Wait until `predicate` holds for the current status
    pub async fn wait_for_status(
        &self,
        predicate: impl FnMut(&StreamStatus) -> bool,
    ) -> StreamStatus {
        let mut status = self.shared.subscribe_status();
        // The sender lives in `shared`, which this handle keeps alive
        let current = match status.wait_for(predicate).await {
            Ok(current) => current.clone(),
            Err(_) => self.shared.status(),
        };
        current
    }

    /// Wait up to `timeout` for the connection to come up
    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_for_status(StreamStatus::connected))
            .await
            .is_ok()
    }

    pub(crate) async fn track(&self, targets: Vec<Target>) -> Result<SubscriptionDiff> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Track { targets, reply })
            .await
            .map_err(|_| StreamError::Closed)?;
        response.await.map_err(|_| StreamError::Closed)
    }

    /// Unsubscribe all, disconnect, discard state and wait for the worker.
    ///
    /// Idempotent.
    #[instrument(name = "stream_handle_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = ?e, "Stream worker panicked");
            }
            debug!("Stream handle shutdown complete");
        }
    }
}

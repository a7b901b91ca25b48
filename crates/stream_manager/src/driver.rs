//! Stream worker task
//!
//! Owns the connector, the subscription manager and the single broker
//! session. Commands from the handle, broker events and the staleness tick
//! are processed one at a time, so handlers never interleave.
//!
//! Lifecycle: `Disconnected -> Connecting -> Connected -> Disconnected`,
//! with `Reconnecting { attempt }` in between when a backoff is configured.
//! Without one, a lost or failed connection stays down until the handle is
//! dropped. Teardown always unsubscribes everything before disconnecting.

use std::sync::Arc;
use std::time::Duration;

use broker_client::{
    BrokerError, BrokerEvent, BrokerSession, Connection, Connector, InboundMessage, SessionOptions,
};
use contracts::{ConnectionState, DataRequest, VehicleId};
use observability::{
    record_connection_state, record_data_stale, record_reconnect_attempt,
    record_subscriptions_active,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::event::StreamEvent;
use crate::handler::MessageHandler;
use crate::reconnect::Backoff;
use crate::shared::Shared;
use crate::subscriptions::{SubscriptionDiff, SubscriptionManager, Target};

/// Requests from a stream handle
pub(crate) enum Command {
    Track {
        targets: Vec<Target>,
        reply: oneshot::Sender<SubscriptionDiff>,
    },
    Shutdown,
}

pub(crate) struct DriverConfig {
    pub endpoint: Option<String>,
    pub options: SessionOptions,
    pub backoff: Option<Backoff>,
    pub stale_after_ms: u64,
    /// Publish a data request per tracked vehicle after connect / on add
    pub request_on_connect: bool,
}

impl DriverConfig {
    fn stale_tick(&self) -> Duration {
        Duration::from_millis((self.stale_after_ms / 4).max(50))
    }
}

enum ConnectOutcome {
    Connected(Connection),
    Failed(BrokerError),
    Shutdown,
}

enum SessionEnd {
    Shutdown,
    Lost,
}

pub(crate) struct Driver<C> {
    connector: Arc<C>,
    config: DriverConfig,
    shared: Arc<Shared>,
    subscriptions: SubscriptionManager,
    handler: MessageHandler,
    commands: mpsc::Receiver<Command>,
}

impl<C> Driver<C>
where
    C: Connector + Send + Sync + 'static,
{
    pub fn new(
        connector: C,
        config: DriverConfig,
        shared: Arc<Shared>,
        subscriptions: SubscriptionManager,
        handler: MessageHandler,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            shared,
            subscriptions,
            handler,
            commands,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    #[instrument(
        name = "stream_driver_loop",
        skip(self),
        fields(endpoint = self.config.endpoint.as_deref().unwrap_or("<unset>"))
    )]
    async fn run(mut self) {
        let Some(endpoint) = self.config.endpoint.clone() else {
            warn!("No broker endpoint configured, connector disabled");
            self.idle().await;
            self.teardown(None);
            return;
        };

        let mut attempt: u32 = 0;
        loop {
            self.set_connection(ConnectionState::Connecting);
            info!(endpoint = %endpoint, "Connecting to broker");

            match self.connect(&endpoint).await {
                ConnectOutcome::Shutdown => {
                    self.teardown(None);
                    return;
                }
                ConnectOutcome::Connected(connection) => {
                    attempt = 0;
                    if let SessionEnd::Shutdown = self.run_session(connection).await {
                        return;
                    }
                }
                ConnectOutcome::Failed(e) => {
                    error!(endpoint = %endpoint, error = %e, "Broker connect failed");
                }
            }
            self.set_connection(ConnectionState::Disconnected);

            let Some(backoff) = self.config.backoff.clone() else {
                info!("No reconnect policy, staying disconnected");
                self.idle().await;
                self.teardown(None);
                return;
            };

            attempt += 1;
            if !backoff.allows(attempt) {
                warn!(
                    attempts = backoff.max_attempts(),
                    "Reconnect attempts exhausted, staying disconnected"
                );
                self.idle().await;
                self.teardown(None);
                return;
            }

            let delay = backoff.delay(attempt);
            record_reconnect_attempt(attempt, delay.as_millis() as u64);
            self.set_connection(ConnectionState::Reconnecting { attempt });
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");

            if !self.wait(delay).await {
                self.teardown(None);
                return;
            }
        }
    }

    /// Handshake, still answering commands while it is in flight
    async fn connect(&mut self, endpoint: &str) -> ConnectOutcome {
        let connector = Arc::clone(&self.connector);
        let options = self.config.options.clone();
        let endpoint = endpoint.to_string();
        let connect = async move { connector.connect(&endpoint, &options).await };
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => {
                    return match result {
                        Ok(connection) => ConnectOutcome::Connected(connection),
                        Err(e) => ConnectOutcome::Failed(e),
                    };
                }
                command = self.commands.recv() => match command {
                    Some(Command::Track { targets, reply }) => {
                        let diff = self.apply_track(targets, None);
                        let _ = reply.send(diff);
                    }
                    Some(Command::Shutdown) | None => return ConnectOutcome::Shutdown,
                },
            }
        }
    }

    async fn run_session(&mut self, connection: Connection) -> SessionEnd {
        let Connection {
            session,
            mut events,
        } = connection;

        let now = self.shared.now_ms();
        self.shared.set_session(Some(Arc::clone(&session)));
        self.shared.store().on_connected(now);
        info!("Connected to broker");

        let attached = self.subscriptions.attach(session.as_ref());
        let active = self.subscriptions.active_count();
        record_subscriptions_active(active);
        self.shared.update_status(|status| {
            status.subscriptions = active;
            status.data_timeout_warning = false;
        });
        self.request_data(&attached);
        self.set_connection(ConnectionState::Connected);

        let period = self.config.stale_tick();
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Track { targets, reply }) => {
                        let diff = self.apply_track(targets, Some(&session));
                        self.request_data(&diff.added);
                        let _ = reply.send(diff);
                    }
                    Some(Command::Shutdown) | None => {
                        self.teardown(Some(&session));
                        return SessionEnd::Shutdown;
                    }
                },
                event = events.recv() => match event {
                    Some(BrokerEvent::Message(message)) => self.on_message(message),
                    Some(BrokerEvent::Error { message }) => {
                        error!(message = %message, "Broker reported an error");
                    }
                    Some(BrokerEvent::Closed { reason }) => {
                        warn!(reason = %reason, "Broker connection closed");
                        break;
                    }
                    None => {
                        warn!("Broker event stream ended");
                        break;
                    }
                },
                _ = tick.tick() => self.check_stale(),
            }
        }

        self.shared.set_session(None);
        self.subscriptions.detach();
        self.shared.store().on_disconnected();
        record_subscriptions_active(0);
        self.shared.update_status(|status| {
            status.subscriptions = 0;
            status.data_timeout_warning = false;
        });
        SessionEnd::Lost
    }

    /// Disconnected for good: answer commands until shutdown
    async fn idle(&mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Track { targets, reply } => {
                    let diff = self.apply_track(targets, None);
                    let _ = reply.send(diff);
                }
                Command::Shutdown => return,
            }
        }
    }

    /// Sleep before a reconnect; false when shut down meanwhile
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Track { targets, reply }) => {
                        let diff = self.apply_track(targets, None);
                        let _ = reply.send(diff);
                    }
                    Some(Command::Shutdown) | None => return false,
                },
            }
        }
    }

    fn apply_track(
        &mut self,
        targets: Vec<Target>,
        session: Option<&Arc<dyn BrokerSession>>,
    ) -> SubscriptionDiff {
        let diff = self
            .subscriptions
            .set_targets(targets, session.map(|s| s.as_ref()));
        {
            let mut store = self.shared.store();
            for key in &diff.removed {
                store.forget(key);
            }
        }

        let tracked = self.subscriptions.tracked();
        let active = self.subscriptions.active_count();
        record_subscriptions_active(active);
        info!(
            tracked = tracked.len(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Tracked vehicles updated"
        );
        self.shared.update_status(|status| {
            status.tracked = tracked;
            status.subscriptions = active;
        });
        diff
    }

    fn request_data(&self, vehicles: &[VehicleId]) {
        if !self.config.request_on_connect {
            return;
        }
        for vehicle_id in vehicles {
            let request = DataRequest::new(vehicle_id.clone(), self.shared.now_ms());
            debug!(vehicle_id = %vehicle_id, "Requesting current telemetry");
            self.shared.publish(&request.to_json());
        }
    }

    fn on_message(&mut self, message: InboundMessage) {
        // Unknown route: unsubscribed already or from an older session
        let Some(route) = self.subscriptions.route(message.subscription).cloned() else {
            trace!(
                subscription = %message.subscription,
                topic = %message.destination,
                "Message for inactive subscription dropped"
            );
            return;
        };
        self.handler.handle(&self.shared, &route, &message.body);
    }

    fn check_stale(&self) {
        let now = self.shared.now_ms();
        let tracking = !self.subscriptions.tracked().is_empty();
        let stale = tracking
            && self
                .shared
                .store()
                .is_stale(now, self.config.stale_after_ms);

        if stale == self.shared.status().data_timeout_warning {
            return;
        }
        if stale {
            warn!(
                stale_after_ms = self.config.stale_after_ms,
                "No fresh telemetry for tracked vehicles"
            );
        }
        record_data_stale(stale);
        self.shared
            .update_status(|status| status.data_timeout_warning = stale);
    }

    fn set_connection(&self, state: ConnectionState) {
        if self.shared.status().connection == state {
            return;
        }
        record_connection_state(state.is_connected());
        self.shared.update_status(|status| status.connection = state);
        self.shared.emit(StreamEvent::Connection(state));
    }

    /// Unsubscribe everything, then disconnect and discard all state
    fn teardown(&mut self, session: Option<&Arc<dyn BrokerSession>>) {
        match session {
            Some(session) => {
                self.subscriptions.unsubscribe_all(session.as_ref());
                session.disconnect();
                info!("Disconnected from broker");
            }
            None => self.subscriptions.detach(),
        }
        self.shared.set_session(None);
        self.shared.store().reset();
        record_subscriptions_active(0);
        self.shared.update_status(|status| {
            status.subscriptions = 0;
            status.data_timeout_warning = false;
        });
        self.set_connection(ConnectionState::Disconnected);
        debug!("Stream worker stopped");
    }
}

//! StreamBuilder - validated construction of stream handles
//!
//! Construction is the only place a stream can return an error. A missing
//! endpoint is not an error: the stream starts with its connector disabled.

use std::sync::Arc;

use broker_client::{Connector, DebugHook, DebugSink, SessionOptions};
use contracts::{
    resolve_topic, BrokerConfig, SharedClock, StreamConfig, SystemClock, TrackingBlueprint,
    VehicleId, MAX_PATH_LIMIT,
};
use ingestion::TelemetryNormalizer;
use path_engine::AccumulatorConfig;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::driver::{Driver, DriverConfig};
use crate::error::{Result, StreamError};
use crate::handle::StreamHandle;
use crate::handler::MessageHandler;
use crate::multi::MultiCarStream;
use crate::reconnect::Backoff;
use crate::shared::Shared;
use crate::single::CarStream;
use crate::store::{StreamStatus, StreamStore};
use crate::subscriptions::{SubscriptionManager, Target};

/// State key of a single-vehicle stream opened without a vehicle id
pub const ALL_VEHICLES_KEY: &str = "all";

const COMMAND_BUFFER: usize = 32;

#[derive(Clone)]
pub struct StreamBuilder {
    broker: BrokerConfig,
    stream: StreamConfig,
    clock: SharedClock,
    debug: Option<DebugSink>,
    normalizer: TelemetryNormalizer,
}

impl Default for StreamBuilder {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            stream: StreamConfig::default(),
            clock: Arc::new(SystemClock),
            debug: None,
            normalizer: TelemetryNormalizer::new(),
        }
    }
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blueprint(blueprint: &TrackingBlueprint) -> Self {
        Self::new()
            .broker(blueprint.broker.clone())
            .stream(blueprint.stream.clone())
    }

    pub fn broker(mut self, broker: BrokerConfig) -> Self {
        self.broker = broker;
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.broker.endpoint = Some(endpoint.into());
        self
    }

    pub fn stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Protocol debug lines go to `hook` instead of `tracing`
    pub fn debug_hook(mut self, hook: DebugHook) -> Self {
        self.debug = Some(DebugSink::Hook(hook));
        self
    }

    /// Share ingestion counters with the caller
    pub fn normalizer(mut self, normalizer: TelemetryNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.stream.max_path == 0 {
            return Err(StreamError::config("stream.max_path", "must be > 0"));
        }
        if self.stream.max_path > MAX_PATH_LIMIT {
            return Err(StreamError::config(
                "stream.max_path",
                format!("must be <= {MAX_PATH_LIMIT}"),
            ));
        }
        if self.stream.stale_after_ms == 0 {
            return Err(StreamError::config("stream.stale_after_ms", "must be > 0"));
        }
        if self.broker.publish_destination.trim().is_empty() {
            return Err(StreamError::config(
                "broker.publish_destination",
                "must not be empty",
            ));
        }
        if let Some(policy) = &self.broker.reconnect {
            if policy.multiplier.is_nan() || policy.multiplier < 1.0 {
                return Err(StreamError::config(
                    "broker.reconnect.multiplier",
                    "must be >= 1",
                ));
            }
            if policy.max_attempts == 0 {
                return Err(StreamError::config(
                    "broker.reconnect.max_attempts",
                    "must be > 0",
                ));
            }
        }
        Ok(())
    }

    /// Track one vehicle (or the shared topic when `vehicle_id` is `None`)
    pub fn spawn_single<C>(self, connector: C, vehicle_id: Option<VehicleId>) -> Result<CarStream>
    where
        C: Connector + Send + Sync + 'static,
    {
        self.validate()?;
        let override_topic = self.stream.topic_override.as_deref();
        let topic = resolve_topic(vehicle_id.as_ref(), self.stream.by_car, override_topic);
        let per_vehicle = override_topic.map_or(true, str::is_empty) && self.stream.by_car;

        let key = vehicle_id
            .clone()
            .unwrap_or_else(|| VehicleId::from(ALL_VEHICLES_KEY));
        let target = Target::shared(key.clone(), topic.clone(), per_vehicle && vehicle_id.is_some());

        info!(
            vehicle_id = %key,
            topic = %topic,
            by_car = self.stream.by_car,
            "Starting single-vehicle stream"
        );
        let handle = self.spawn_with(connector, vec![target], Some(topic.clone()), false)?;
        Ok(CarStream::new(handle, key, topic))
    }

    /// Track a set of vehicles, one per-vehicle topic each
    pub fn spawn_multi<C>(
        self,
        connector: C,
        vehicles: impl IntoIterator<Item = VehicleId>,
    ) -> Result<MultiCarStream>
    where
        C: Connector + Send + Sync + 'static,
    {
        self.validate()?;
        let targets: Vec<Target> = vehicles.into_iter().map(Target::vehicle).collect();
        if let Some(topic) = self.stream.topic_override.as_deref() {
            warn!(topic, "topic_override applies to single-vehicle streams only, ignored");
        }

        info!(vehicles = targets.len(), "Starting multi-vehicle stream");
        let request_on_connect = self.stream.request_on_connect;
        let handle = self.spawn_with(connector, targets, None, request_on_connect)?;
        Ok(MultiCarStream::new(handle))
    }

    fn spawn_with<C>(
        self,
        connector: C,
        targets: Vec<Target>,
        topic: Option<String>,
        request_on_connect: bool,
    ) -> Result<StreamHandle>
    where
        C: Connector + Send + Sync + 'static,
    {
        let debug = self
            .debug
            .clone()
            .unwrap_or_else(|| DebugSink::from_flag(self.stream.debug));
        let options = SessionOptions::from_config(&self.broker, debug);

        let mut subscriptions = SubscriptionManager::new();
        subscriptions.set_targets(targets, None);

        let status = StreamStatus {
            topic,
            tracked: subscriptions.tracked(),
            ..StreamStatus::default()
        };
        let shared = Arc::new(Shared::new(
            StreamStore::new(AccumulatorConfig::from(&self.stream)),
            status,
            self.clock,
            self.broker.publish_destination.clone(),
            self.broker.event_buffer,
        ));

        let config = DriverConfig {
            endpoint: self.broker.endpoint().map(str::to_string),
            options,
            backoff: self.broker.reconnect.clone().map(Backoff::new),
            stale_after_ms: self.stream.stale_after_ms,
            request_on_connect,
        };

        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let driver = Driver::new(
            connector,
            config,
            Arc::clone(&shared),
            subscriptions,
            MessageHandler::new(self.normalizer),
            receiver,
        );
        let worker = driver.spawn();
        Ok(StreamHandle::new(shared, commands, worker))
    }
}

//! Pipeline orchestrator - wires a stream, the map renderer and statistics.
//!
//! Runs against the WebSocket connector, or against an in-memory broker fed
//! with synthetic telemetry in mock mode.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use broker_client::{Connector, MockBroker, WsConnector};
use contracts::{
    vehicle_topic, Clock, ConnectionState, DataRequest, SystemClock, TrackingBlueprint, VehicleId,
    VehicleStreamState,
};
use stream_manager::{
    CarStream, LogSurface, MapRenderer, MultiCarStream, StreamBuilder, StreamEvent, StreamStatus,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::mock_feed::{self, FeedTarget};
use super::PipelineStats;

const MOCK_ENDPOINT: &str = "ws://mock.local/ws";
const MOCK_PERIOD: Duration = Duration::from_millis(250);
const CONNECT_WAIT: Duration = Duration::from_secs(10);
const FOLLOW_ZOOM: u8 = 15;

/// Which stream variant to open
#[derive(Debug, Clone, PartialEq)]
pub enum TrackMode {
    /// One topic: a vehicle's own, or the shared topic when `None`
    Single(Option<VehicleId>),
    /// One per-vehicle subscription each
    Multi(Vec<VehicleId>),
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub blueprint: TrackingBlueprint,

    pub mode: TrackMode,

    /// Run duration (None = until the shutdown signal)
    pub duration: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// Publish a data request per vehicle after connecting (single stream)
    pub request: bool,

    pub follow: Option<VehicleId>,

    pub render_interval: Duration,

    /// Use an in-memory broker with synthetic telemetry
    pub mock: bool,
}

/// Either stream variant behind one surface
enum Tracker {
    Single(CarStream),
    Multi(MultiCarStream),
}

impl Tracker {
    fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
        match self {
            Self::Single(s) => s.subscribe_events(),
            Self::Multi(m) => m.subscribe_events(),
        }
    }

    fn status(&self) -> StreamStatus {
        match self {
            Self::Single(s) => s.status(),
            Self::Multi(m) => m.status(),
        }
    }

    fn vehicle_data(&self) -> BTreeMap<VehicleId, VehicleStreamState> {
        match self {
            Self::Single(s) => {
                let mut data = BTreeMap::new();
                if let Some(last_point) = s.last_point() {
                    data.insert(
                        s.key().clone(),
                        VehicleStreamState {
                            last_point: Some(last_point),
                            last_telemetry: s.last_telemetry(),
                            path: s.get_path(),
                        },
                    );
                }
                data
            }
            Self::Multi(m) => m.vehicle_data(),
        }
    }

    async fn wait_for_connection(&self, timeout: Duration) -> bool {
        match self {
            Self::Single(s) => s.wait_for_connection(timeout).await,
            Self::Multi(m) => m.wait_for_connection(timeout).await,
        }
    }

    fn publish(&self, request: &DataRequest) {
        let payload = request.to_json();
        match self {
            Self::Single(s) => s.publish(&payload),
            Self::Multi(m) => m.publish(&payload),
        }
    }

    async fn shutdown(&self) {
        match self {
            Self::Single(s) => s.shutdown().await,
            Self::Multi(m) => m.shutdown().await,
        }
    }
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` resolves or the configured duration elapses
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let mut builder = StreamBuilder::from_blueprint(&self.config.blueprint);

        if !self.config.mock {
            if self.config.blueprint.broker.endpoint().is_none() {
                warn!("No broker endpoint configured, the stream will stay disconnected");
            }
            return self.run_with(builder, WsConnector::new(), None, shutdown).await;
        }

        info!("Running in MOCK mode (no broker required)");
        if self.config.blueprint.broker.endpoint().is_none() {
            builder = builder.endpoint(MOCK_ENDPOINT);
        }
        let broker = MockBroker::new();
        self.run_with(builder, broker.clone(), Some(broker), shutdown)
            .await
    }

    async fn run_with<C>(
        &self,
        builder: StreamBuilder,
        connector: C,
        mock: Option<MockBroker>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<PipelineStats>
    where
        C: Connector + Send + Sync + 'static,
    {
        let start_time = Instant::now();
        let mut stats = PipelineStats::default();

        let (tracker, feed_targets) = match &self.config.mode {
            TrackMode::Single(vehicle_id) => {
                let stream = builder
                    .spawn_single(connector, vehicle_id.clone())
                    .context("Failed to start single-vehicle stream")?;
                stats.mode = "single";
                stats.target = stream.topic().to_string();

                let feed = match vehicle_id {
                    Some(id) => vec![id.clone()],
                    None => (1..=3).map(|n| VehicleId::from(format!("veh-{n:04}"))).collect(),
                };
                let targets = feed
                    .into_iter()
                    .map(|vehicle_id| FeedTarget {
                        destination: stream.topic().to_string(),
                        vehicle_id,
                    })
                    .collect::<Vec<_>>();
                (Tracker::Single(stream), targets)
            }
            TrackMode::Multi(vehicles) => {
                let stream = builder
                    .spawn_multi(connector, vehicles.iter().cloned())
                    .context("Failed to start multi-vehicle stream")?;
                stats.mode = "multi";
                stats.target = format!("{} vehicles", vehicles.len());

                let targets = vehicles
                    .iter()
                    .map(|vehicle_id| FeedTarget {
                        destination: vehicle_topic(vehicle_id),
                        vehicle_id: vehicle_id.clone(),
                    })
                    .collect::<Vec<_>>();
                (Tracker::Multi(stream), targets)
            }
        };

        let feeder = mock.map(|broker| mock_feed::spawn(broker, feed_targets, MOCK_PERIOD));

        let mut events = tracker.subscribe_events();
        let mut renderer = MapRenderer::new(LogSurface::without_history());
        renderer.follow(self.config.follow.clone(), Some(FOLLOW_ZOOM));

        if tracker.wait_for_connection(CONNECT_WAIT).await {
            info!(mode = stats.mode, target = %stats.target, "Stream connected");
        } else {
            warn!(
                wait_secs = CONNECT_WAIT.as_secs(),
                "Stream not connected yet, continuing to wait"
            );
        }

        let mut requested = false;
        if tracker.status().connected() {
            self.request_data(&tracker);
            requested = true;
        }

        let mut render_tick = tokio::time::interval(self.config.render_interval);
        let mut stale = false;
        let deadline = async {
            match self.config.duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping stream...");
                    break;
                }
                _ = &mut deadline => {
                    info!("Run duration elapsed");
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        match &event {
                            StreamEvent::Connection(ConnectionState::Connected) if !requested => {
                                self.request_data(&tracker);
                                requested = true;
                            }
                            StreamEvent::Connection(ConnectionState::Disconnected) => {
                                requested = false;
                            }
                            _ => {}
                        }
                        stats.record(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Statistics observer lagged");
                        stats.events_lagged += skipped;
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = render_tick.tick() => {
                    renderer.sync(&tracker.vehicle_data());
                    let warning = tracker.status().data_timeout_warning;
                    if warning && !stale {
                        stats.stale_warnings += 1;
                    }
                    stale = warning;
                }
            }
        }

        info!("Shutting down stream...");
        renderer.sync(&tracker.vehicle_data());
        stats.markers = renderer.rendered();
        tracker.shutdown().await;
        if let Some(feeder) = feeder {
            feeder.abort();
        }

        stats.final_status = tracker.status();
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            points_per_sec = format!("{:.2}", stats.points_per_sec()),
            "Stream shutdown complete"
        );

        Ok(stats)
    }

    /// Single streams only; the multi-vehicle stream requests on its own
    fn request_data(&self, tracker: &Tracker) {
        if !self.config.request {
            return;
        }
        if let (Tracker::Single(_), TrackMode::Single(Some(vehicle_id))) =
            (tracker, &self.config.mode)
        {
            debug!(vehicle_id = %vehicle_id, "Requesting current telemetry");
            tracker.publish(&DataRequest::new(vehicle_id.clone(), SystemClock.now_ms()));
        }
    }
}

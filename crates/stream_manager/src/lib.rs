//! # Stream Manager
//!
//! Live vehicle telemetry streams over a single broker connection.
//!
//! Responsibilities:
//! - Connection lifecycle, optional reconnect with backoff
//! - Topic subscriptions, diffed when the tracked set changes
//! - Normalize, throttle and accumulate paths per vehicle
//! - Staleness watchdog and status / event fan-out
//! - Map rendering through an opaque `MapSurface`
//!
//! ## Usage
//!
//! ```ignore
//! use broker_client::WsConnector;
//! use stream_manager::StreamBuilder;
//!
//! let stream = StreamBuilder::new()
//!     .endpoint("http://localhost:8080/ws")
//!     .spawn_multi(WsConnector, ["veh-0001".into(), "veh-0002".into()])?;
//!
//! stream.wait_for_connection(Duration::from_secs(5)).await;
//! for (id, state) in stream.vehicle_data() {
//!     println!("{id}: {} points", state.path.len());
//! }
//! stream.shutdown().await;
//! ```

mod builder;
mod driver;
pub mod error;
mod event;
mod handle;
mod handler;
mod multi;
pub mod reconnect;
pub mod render;
mod shared;
mod single;
mod store;
pub mod subscriptions;

pub use builder::{StreamBuilder, ALL_VEHICLES_KEY};
pub use error::{Result, StreamError};
pub use event::StreamEvent;
pub use handle::StreamHandle;
pub use multi::MultiCarStream;
pub use reconnect::Backoff;
pub use render::{LatLng, LogSurface, MapRenderer, MapSurface, MarkerStyle};
pub use single::CarStream;
pub use store::{StreamStatus, StreamStore};
pub use subscriptions::{Route, SubscriptionDiff, SubscriptionManager, Target};

pub use contracts::{CanonicalTelemetry, ConnectionState, PathPoint, VehicleId, VehicleStreamState};

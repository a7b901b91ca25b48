//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the fleet tracking
//! workspace: vehicle identifiers, canonical telemetry, path points, topic
//! naming, configuration and the error taxonomy.
//! Business crates depend on this crate only, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Epoch milliseconds (`i64`) everywhere, read through [`Clock`]
//! - Payload timestamps are advisory; throttling uses arrival time

mod blueprint;
mod clock;
mod config;
mod connection;
mod error;
mod request;
mod telemetry;
pub mod topic;
mod vehicle_id;

pub use blueprint::*;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::*;
pub use connection::ConnectionState;
pub use error::*;
pub use request::DataRequest;
pub use telemetry::*;
pub use topic::{
    resolve_topic, vehicle_topic, ALL_VEHICLES_TOPIC, TELEMETRY_DESTINATION, VEHICLE_TOPIC_PREFIX,
};
pub use vehicle_id::VehicleId;

//! # Ingestion
//!
//! Telemetry normalization.
//!
//! Responsibilities:
//! - Parse inbound message bodies as JSON
//! - Resolve position fields through ordered alias chains
//! - Derive record timestamps, falling back to the wall clock
//! - Reject payloads without a finite position, with logging and counters
//!
//! ## Usage Example
//!
//! ```
//! use contracts::VehicleId;
//! use ingestion::TelemetryNormalizer;
//!
//! let normalizer = TelemetryNormalizer::new();
//! let id = VehicleId::from("veh-0001");
//! let record = normalizer
//!     .normalize(br#"{"lat": 37.5, "lng": 127.0, "speed": 30}"#, &id, 0)
//!     .unwrap();
//! assert_eq!(record.latitude, 37.5);
//! assert_eq!(record.heading, None);
//! ```

mod error;
pub mod extract;
mod metrics;
mod normalizer;
pub mod timestamp;

// Re-exports
pub use error::{IngestionError, Result};
pub use extract::{CoordinateError, FieldPath, LATITUDE_CHAIN, LONGITUDE_CHAIN};
pub use metrics::{IngestionMetrics, MetricsSnapshot};
pub use normalizer::TelemetryNormalizer;
pub use timestamp::{derive_timestamp, DerivedTimestamp};

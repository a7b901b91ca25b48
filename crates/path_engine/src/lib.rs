//! # Path Engine
//!
//! Per-vehicle sampling and bounded path history.
//!
//! Responsibilities:
//! - Throttle: admit at most one record per vehicle per interval
//! - Path window: bounded, grows on demand, oldest-first eviction
//!
//! ## Usage Example
//!
//! ```ignore
//! use path_engine::{AccumulatorConfig, PathAccumulator};
//!
//! let mut acc = PathAccumulator::new(AccumulatorConfig { throttle_ms: 200, max_path: 5000 });
//!
//! // For every normalized record
//! if let Admission::Accepted(point) = acc.accept(&vehicle_id, &record, clock.now_ms()) {
//!     // Publish point to consumers
//! }
//! ```

mod accumulator;
mod buffer;
mod throttle;

// Re-exports
pub use accumulator::{AccumulatorConfig, Admission, PathAccumulator};
pub use buffer::PathBuffer;
pub use throttle::Throttle;

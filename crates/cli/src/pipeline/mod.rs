//! Stream orchestration module.

mod mock_feed;
mod orchestrator;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig, TrackMode};
pub use stats::PipelineStats;

//! Run statistics and summary output.

use std::time::Duration;

use contracts::ConnectionState;
use observability::StreamMetricsAggregator;
use stream_manager::{StreamEvent, StreamStatus};

/// Statistics from a tracking run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Total duration of the run
    pub duration: Duration,

    /// "single" / "multi"
    pub mode: &'static str,

    /// Subscribed topic (single) or tracked vehicle count (multi)
    pub target: String,

    /// Times the stream reached `Connected`
    pub connects: u64,

    /// Payloads whose vehicleId disagreed with their topic
    pub mismatches: u64,

    /// Times the staleness warning was raised
    pub stale_warnings: u64,

    /// Events the observer missed because it lagged
    pub events_lagged: u64,

    /// Vehicles drawn on the map at the end of the run
    pub markers: usize,

    /// Status at shutdown time
    pub final_status: StreamStatus,

    /// Per-vehicle counters fed from stream events
    pub metrics: StreamMetricsAggregator,
}

impl PipelineStats {
    pub fn record(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Connection(ConnectionState::Connected) => self.connects += 1,
            StreamEvent::Connection(ConnectionState::Reconnecting { .. }) => {
                self.metrics.on_reconnect_attempt();
            }
            StreamEvent::Connection(_) => {}
            StreamEvent::Accepted {
                vehicle_id,
                point,
                at_ms,
            } => {
                self.metrics.on_received(vehicle_id);
                self.metrics.on_accepted(vehicle_id, point, *at_ms);
            }
            StreamEvent::Throttled { vehicle_id } => {
                self.metrics.on_received(vehicle_id);
                self.metrics.on_throttled(vehicle_id);
            }
            StreamEvent::Rejected { vehicle_id, .. } => {
                self.metrics.on_received(vehicle_id);
                self.metrics.on_rejected(vehicle_id);
            }
            StreamEvent::VehicleMismatch { .. } => self.mismatches += 1,
            StreamEvent::Published { success } => self.metrics.on_publish(*success),
        }
    }

    /// Accepted points per second
    pub fn points_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.metrics.total_accepted() as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Tracking Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        let summary = self.metrics.summary();

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Mode: {} ({})", self.mode, self.target);
        println!("   ├─ Connects: {}", self.connects);
        println!("   ├─ Reconnect attempts: {}", summary.reconnect_attempts);
        println!("   ├─ Stale warnings: {}", self.stale_warnings);
        println!("   ├─ vehicleId mismatches: {}", self.mismatches);
        println!("   └─ Final state: {}", self.final_status.connection);

        println!("\n📈 Messages");
        println!("   ├─ Received: {}", summary.total_received);
        println!("   ├─ Accepted: {} ({:.2}/s)", summary.total_accepted, self.points_per_sec());
        println!("   ├─ Throttled: {}", summary.total_throttled);
        println!(
            "   ├─ Rejected: {} ({:.2}%)",
            summary.total_rejected, summary.reject_rate
        );
        println!(
            "   └─ Publishes: {} sent, {} dropped",
            summary.publishes_sent, summary.publishes_dropped
        );

        if !summary.vehicles.is_empty() {
            println!("\n🚗 Vehicles ({}, {} on map)", summary.vehicles.len(), self.markers);
            for (i, vehicle) in summary.vehicles.iter().enumerate() {
                let is_last = i == summary.vehicles.len() - 1;
                let prefix = if is_last { "└─" } else { "├─" };
                let child = if is_last { "   " } else { "│  " };
                println!(
                    "   {} {}: {} accepted, {} throttled, {} rejected",
                    prefix, vehicle.vehicle_id, vehicle.accepted, vehicle.throttled, vehicle.rejected
                );
                println!("   {}  ├─ interval (ms): {}", child, vehicle.interval_ms);
                println!("   {}  └─ speed (km/h): {}", child, vehicle.speed_kmh);
            }
        }

        if self.events_lagged > 0 {
            println!("\n⚠️  {} events missed by the statistics observer", self.events_lagged);
        }

        println!();
    }
}

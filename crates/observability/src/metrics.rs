//! 流指标收集模块
//!
//! 记录 telemetry 流的运行指标 (Prometheus)，并提供内存聚合器用于输出摘要。

use std::collections::BTreeMap;

use contracts::{PathPoint, VehicleId};
use metrics::{counter, gauge, histogram};

/// 记录收到一条入站消息 (无论是否被接受)
pub fn record_message_received(vehicle_id: &VehicleId) {
    counter!(
        "fleet_stream_messages_received_total",
        "vehicle_id" => vehicle_id.to_string()
    )
    .increment(1);
}

/// 记录一个被接受的路径点
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_point_accepted;
///
/// if let Admission::Accepted(point) = accumulator.accept(&id, &record, now) {
///     record_point_accepted(&id, &point, accumulator.path_len(&id));
/// }
/// ```
pub fn record_point_accepted(vehicle_id: &VehicleId, point: &PathPoint, path_len: usize) {
    counter!(
        "fleet_stream_points_accepted_total",
        "vehicle_id" => vehicle_id.to_string()
    )
    .increment(1);

    gauge!(
        "fleet_stream_path_length",
        "vehicle_id" => vehicle_id.to_string()
    )
    .set(path_len as f64);

    histogram!("fleet_stream_speed_kmh").record(point.speed_kmh);
}

/// 记录被节流丢弃的记录
pub fn record_point_throttled(vehicle_id: &VehicleId) {
    counter!(
        "fleet_stream_points_throttled_total",
        "vehicle_id" => vehicle_id.to_string()
    )
    .increment(1);
}

/// 记录负载 vehicleId 与订阅不一致
pub fn record_vehicle_mismatch(vehicle_id: &VehicleId) {
    counter!(
        "fleet_stream_vehicle_mismatch_total",
        "vehicle_id" => vehicle_id.to_string()
    )
    .increment(1);
}

/// 记录连接状态 (1 = 已连接)
pub fn record_connection_state(connected: bool) {
    gauge!("fleet_stream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// 记录一次重连尝试
pub fn record_reconnect_attempt(attempt: u32, delay_ms: u64) {
    counter!("fleet_stream_reconnect_attempts_total").increment(1);
    gauge!("fleet_stream_reconnect_attempt").set(attempt as f64);
    histogram!("fleet_stream_reconnect_delay_ms").record(delay_ms as f64);
}

/// 记录出站消息发布
pub fn record_publish(success: bool) {
    let status = if success { "success" } else { "dropped" };
    counter!(
        "fleet_stream_publish_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录活跃订阅数
pub fn record_subscriptions_active(count: usize) {
    gauge!("fleet_stream_subscriptions_active").set(count as f64);
}

/// 记录数据是否过期
pub fn record_data_stale(stale: bool) {
    gauge!("fleet_stream_data_stale").set(if stale { 1.0 } else { 0.0 });
}

/// 单车统计
#[derive(Debug, Clone, Default)]
pub struct VehicleCounters {
    /// 收到的消息数
    pub received: u64,

    /// 写入路径的点数
    pub accepted: u64,

    /// 被节流丢弃的记录数
    pub throttled: u64,

    /// 被拒绝的消息数 (解析失败 / 坐标无效)
    pub rejected: u64,

    /// 相邻接受点的时间间隔 (毫秒)
    pub interval_stats: RunningStats,

    /// 速度 (km/h)
    pub speed_stats: RunningStats,

    last_accept_ms: Option<i64>,
}

/// 流指标聚合器
///
/// 在内存中按车辆聚合，便于运行结束时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct StreamMetricsAggregator {
    /// 按车辆 ID 排序
    pub vehicles: BTreeMap<VehicleId, VehicleCounters>,

    /// 成功发布的出站消息数
    pub publishes_sent: u64,

    /// 未连接时被丢弃的出站消息数
    pub publishes_dropped: u64,

    /// 重连尝试次数
    pub reconnect_attempts: u64,
}

impl StreamMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, vehicle_id: &VehicleId) -> &mut VehicleCounters {
        self.vehicles.entry(vehicle_id.clone()).or_default()
    }

    pub fn on_received(&mut self, vehicle_id: &VehicleId) {
        self.entry(vehicle_id).received += 1;
    }

    /// `now_ms` 为接受时刻 (到达时间，而非 payload 时间戳)
    pub fn on_accepted(&mut self, vehicle_id: &VehicleId, point: &PathPoint, now_ms: i64) {
        let counters = self.entry(vehicle_id);
        counters.accepted += 1;
        counters.speed_stats.push(point.speed_kmh);
        if let Some(last) = counters.last_accept_ms {
            counters.interval_stats.push((now_ms - last) as f64);
        }
        counters.last_accept_ms = Some(now_ms);
    }

    pub fn on_throttled(&mut self, vehicle_id: &VehicleId) {
        self.entry(vehicle_id).throttled += 1;
    }

    pub fn on_rejected(&mut self, vehicle_id: &VehicleId) {
        self.entry(vehicle_id).rejected += 1;
    }

    pub fn on_publish(&mut self, success: bool) {
        if success {
            self.publishes_sent += 1;
        } else {
            self.publishes_dropped += 1;
        }
    }

    pub fn on_reconnect_attempt(&mut self) {
        self.reconnect_attempts += 1;
    }

    /// 所有车辆收到的消息总数
    pub fn total_received(&self) -> u64 {
        self.vehicles.values().map(|c| c.received).sum()
    }

    /// 所有车辆接受的点总数
    pub fn total_accepted(&self) -> u64 {
        self.vehicles.values().map(|c| c.accepted).sum()
    }

    /// 生成摘要报告
    pub fn summary(&self) -> StreamMetricsSummary {
        let total_received = self.total_received();
        let total_accepted = self.total_accepted();
        let total_throttled = self.vehicles.values().map(|c| c.throttled).sum();
        let total_rejected: u64 = self.vehicles.values().map(|c| c.rejected).sum();

        let vehicles = self
            .vehicles
            .iter()
            .map(|(id, c)| VehicleSummary {
                vehicle_id: id.clone(),
                received: c.received,
                accepted: c.accepted,
                throttled: c.throttled,
                rejected: c.rejected,
                interval_ms: StatsSummary::from(&c.interval_stats),
                speed_kmh: StatsSummary::from(&c.speed_stats),
            })
            .collect();

        StreamMetricsSummary {
            total_received,
            total_accepted,
            total_throttled,
            total_rejected,
            reject_rate: if total_received > 0 {
                total_rejected as f64 / total_received as f64 * 100.0
            } else {
                0.0
            },
            publishes_sent: self.publishes_sent,
            publishes_dropped: self.publishes_dropped,
            reconnect_attempts: self.reconnect_attempts,
            vehicles,
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 单车摘要
#[derive(Debug, Clone, Default)]
pub struct VehicleSummary {
    pub vehicle_id: VehicleId,
    pub received: u64,
    pub accepted: u64,
    pub throttled: u64,
    pub rejected: u64,
    pub interval_ms: StatsSummary,
    pub speed_kmh: StatsSummary,
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct StreamMetricsSummary {
    pub total_received: u64,
    pub total_accepted: u64,
    pub total_throttled: u64,
    pub total_rejected: u64,
    pub reject_rate: f64,
    pub publishes_sent: u64,
    pub publishes_dropped: u64,
    pub reconnect_attempts: u64,
    pub vehicles: Vec<VehicleSummary>,
}

impl std::fmt::Display for StreamMetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Stream Metrics Summary ===")?;
        writeln!(f, "Messages received: {}", self.total_received)?;
        writeln!(f, "Points accepted: {}", self.total_accepted)?;
        writeln!(f, "Throttled: {}", self.total_throttled)?;
        writeln!(
            f,
            "Rejected: {} ({:.2}%)",
            self.total_rejected, self.reject_rate
        )?;
        writeln!(
            f,
            "Publishes: {} sent, {} dropped",
            self.publishes_sent, self.publishes_dropped
        )?;
        writeln!(f, "Reconnect attempts: {}", self.reconnect_attempts)?;

        for vehicle in &self.vehicles {
            writeln!(
                f,
                "  {}: received={} accepted={} throttled={} rejected={}",
                vehicle.vehicle_id,
                vehicle.received,
                vehicle.accepted,
                vehicle.throttled,
                vehicle.rejected
            )?;
            writeln!(f, "    interval (ms): {}", vehicle.interval_ms)?;
            writeln!(f, "    speed (km/h): {}", vehicle.speed_kmh)?;
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

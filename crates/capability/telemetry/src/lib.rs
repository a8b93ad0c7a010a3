//! 日志初始化与进程内计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub readings_produced: u64,
    pub readings_skipped: u64,
    pub sink_push_success: u64,
    pub sink_push_failure: u64,
    pub stale_alerts: u64,
    pub telegram_crc_failures: u64,
    pub reconnects: u64,
    pub rediscoveries: u64,
}

/// 桥接进程计数指标。
pub struct TelemetryMetrics {
    readings_produced: AtomicU64,
    readings_skipped: AtomicU64,
    sink_push_success: AtomicU64,
    sink_push_failure: AtomicU64,
    stale_alerts: AtomicU64,
    telegram_crc_failures: AtomicU64,
    reconnects: AtomicU64,
    rediscoveries: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            readings_produced: AtomicU64::new(0),
            readings_skipped: AtomicU64::new(0),
            sink_push_success: AtomicU64::new(0),
            sink_push_failure: AtomicU64::new(0),
            stale_alerts: AtomicU64::new(0),
            telegram_crc_failures: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            rediscoveries: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            readings_produced: self.readings_produced.load(Ordering::Relaxed),
            readings_skipped: self.readings_skipped.load(Ordering::Relaxed),
            sink_push_success: self.sink_push_success.load(Ordering::Relaxed),
            sink_push_failure: self.sink_push_failure.load(Ordering::Relaxed),
            stale_alerts: self.stale_alerts.load(Ordering::Relaxed),
            telegram_crc_failures: self.telegram_crc_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            rediscoveries: self.rediscoveries.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录数据源产出一条读数。
pub fn record_reading_produced() {
    metrics().readings_produced.fetch_add(1, Ordering::Relaxed);
}

/// 记录一条缺失功率字段而被跳过的消息。
pub fn record_reading_skipped() {
    metrics().readings_skipped.fetch_add(1, Ordering::Relaxed);
}

/// 记录显示屏推送结果。
pub fn record_sink_push(success: bool) {
    if success {
        metrics().sink_push_success.fetch_add(1, Ordering::Relaxed);
    } else {
        metrics().sink_push_failure.fetch_add(1, Ordering::Relaxed);
    }
}

/// 记录过期告警。
pub fn record_stale_alert() {
    metrics().stale_alerts.fetch_add(1, Ordering::Relaxed);
}

/// 记录 CRC 校验失败的报文。
pub fn record_telegram_crc_failure() {
    metrics().telegram_crc_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次重连尝试。
pub fn record_reconnect() {
    metrics().reconnects.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次重新发现。
pub fn record_rediscovery() {
    metrics().rediscoveries.fetch_add(1, Ordering::Relaxed);
}

//! 数据流水线：读数流消费与过期监控，作为一个整体运行。
//!
//! ```text
//! Source ──reading_stream──► 流读取循环 ──push──► Sink
//!                                │
//!                      watch<Instant>（唯一写者）
//!                                ▼
//!                           过期监控 ──push_stale──► Sink
//! ```

mod monitor;

pub use monitor::{StaleAction, StalenessMonitor};

use bridge_ingest::{IngestError, Source, reading_stream};
use bridge_sink::Sink;
use domain::Reading;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 流水线错误：只有数据源的致命错误会结束运行。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("source failed: {0}")]
    Source(#[from] IngestError),
}

/// 过期监控参数。
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub stale_timeout: Duration,
    pub stale_check_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stale_timeout: Duration::from_secs(60),
            stale_check_interval: Duration::from_secs(10),
        }
    }
}

/// 连接数据源，然后并发运行流读取循环与过期监控，直到取消或数据源致命失败。
pub async fn run_bridge(
    source: &mut dyn Source,
    sink: &dyn Sink,
    config: &PipelineConfig,
    cancel: CancellationToken,
) -> Result<(), PipelineError> {
    let name = source.name();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(()),
        connected = source.connect() => connected?,
    }
    info!(source = name, "source connected");

    let (last_reading, observed) = watch::channel(Instant::now());
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!(source = name, "bridge cancelled");
            Ok(())
        }
        result = consume_readings(source, sink, last_reading, cancel.clone()) => result,
        _ = watch_staleness(sink, observed, config) => Ok(()),
    }
}

async fn consume_readings(
    source: &mut dyn Source,
    sink: &dyn Sink,
    last_reading: watch::Sender<Instant>,
    cancel: CancellationToken,
) -> Result<(), PipelineError> {
    let name = source.name();
    let mut readings = reading_stream(source, cancel);
    while let Some(item) = readings.next().await {
        let reading = item?;
        last_reading.send_replace(Instant::now());
        deliver(sink, &reading).await;
        info!(
            source = name,
            timestamp = reading.timestamp().unwrap_or("-"),
            power_watts = reading.power_watts(),
            "reading_received"
        );
    }
    Ok(())
}

async fn deliver(sink: &dyn Sink, reading: &Reading) {
    match sink.push(reading).await {
        Ok(()) => bridge_telemetry::record_sink_push(true),
        Err(err) => {
            bridge_telemetry::record_sink_push(false);
            warn!(error = %err, "display push failed");
        }
    }
}

async fn watch_staleness(
    sink: &dyn Sink,
    last_reading: watch::Receiver<Instant>,
    config: &PipelineConfig,
) {
    let mut monitor = StalenessMonitor::new(config.stale_timeout);
    let period = config.stale_check_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let last = *last_reading.borrow();
        match monitor.evaluate(Instant::now(), last) {
            StaleAction::Alert => {
                warn!(
                    threshold_secs = monitor.threshold().as_secs(),
                    "data_stale"
                );
                bridge_telemetry::record_stale_alert();
                match sink.push_stale().await {
                    Ok(()) => {
                        bridge_telemetry::record_sink_push(true);
                        info!("stale_indicator_pushed");
                    }
                    Err(err) => {
                        bridge_telemetry::record_sink_push(false);
                        warn!(error = %err, "stale indicator push failed");
                    }
                }
            }
            StaleAction::Recovered => info!("data flowing again"),
            StaleAction::Nothing => {}
        }
    }
}

use std::time::Duration;
use tokio::time::Instant;

/// 单次检查的结论。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleAction {
    /// 本轮过期首次被发现，需要推送过期帧。
    Alert,
    /// 数据恢复，告警标志已清除。
    Recovered,
    Nothing,
}

/// 过期判定：同一段连续过期只告警一次。
///
/// `alert_sent` 只由监控器自身修改；读数时间由调用方传入。
#[derive(Debug, Clone)]
pub struct StalenessMonitor {
    threshold: Duration,
    alert_sent: bool,
}

impl StalenessMonitor {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            alert_sent: false,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn alert_sent(&self) -> bool {
        self.alert_sent
    }

    pub fn evaluate(&mut self, now: Instant, last_reading: Instant) -> StaleAction {
        let age = now.saturating_duration_since(last_reading);
        if age > self.threshold {
            if self.alert_sent {
                return StaleAction::Nothing;
            }
            self.alert_sent = true;
            StaleAction::Alert
        } else if self.alert_sent {
            self.alert_sent = false;
            StaleAction::Recovered
        } else {
            StaleAction::Nothing
        }
    }
}

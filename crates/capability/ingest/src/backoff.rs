use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 设备忙（429/503）退避上限。
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// `min(base × 2^failures, cap)`。
pub fn exponential_backoff(base: Duration, failures: u32, cap: Duration) -> Duration {
    let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(cap).min(cap)
}

/// 可取消的等待；被取消时返回 `false`。
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let base = Duration::from_secs(1);
        assert_eq!(exponential_backoff(base, 1, MAX_BACKOFF), Duration::from_secs(2));
        assert_eq!(exponential_backoff(base, 3, MAX_BACKOFF), Duration::from_secs(8));
    }

    #[test]
    fn backoff_is_capped() {
        let base = Duration::from_secs(1);
        assert_eq!(exponential_backoff(base, 5, MAX_BACKOFF), MAX_BACKOFF);
        assert_eq!(exponential_backoff(base, 40, MAX_BACKOFF), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn sleep_returns_false_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!sleep_or_cancel(Duration::from_secs(60), &cancel).await);
    }
}

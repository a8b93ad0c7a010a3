use bridge_discovery::DiscoveryError;

/// 显示屏推送错误。
///
/// 除 `Configuration` 外均只影响单次推送，由流水线记录后继续。
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("display configuration error: {0}")]
    Configuration(String),
    #[error("invalid display url: {0}")]
    InvalidUrl(String),
    #[error("display unreachable: {0}")]
    Connect(String),
    #[error("display request failed: {0}")]
    Http(String),
    #[error("display rejected frame with status {0}")]
    Status(u16),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

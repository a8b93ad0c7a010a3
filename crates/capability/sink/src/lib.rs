//! 显示屏输出端：功率读数格式化为单帧推送，支持发现与地址重绑定。

mod error;
pub mod format;
pub mod lametric;
pub mod url;

pub use error::SinkError;
pub use format::{ICON_CONSUMING, ICON_PRODUCING, ICON_STALE, format_power};
pub use lametric::{LaMetricConfig, LaMetricSink};
pub use url::substitute_host;

use async_trait::async_trait;
use domain::Reading;

/// 读数输出端。
///
/// 流读取循环与过期监控共享同一实例，因此要求 `Sync`。
#[async_trait]
pub trait Sink: Send + Sync {
    async fn push(&self, reading: &Reading) -> Result<(), SinkError>;

    /// 推送固定的“数据过期”帧。
    async fn push_stale(&self) -> Result<(), SinkError>;
}

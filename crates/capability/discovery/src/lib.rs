//! 局域网设备发现：mDNS 定位电表，SSDP 定位显示屏。

mod error;
pub mod mdns;
pub mod ssdp;

pub use error::DiscoveryError;
pub use mdns::MdnsMeterLocator;
pub use ssdp::{SsdpDisplayLocator, SsdpPolicy};

use async_trait::async_trait;
use std::net::IpAddr;

/// 默认发现超时（秒）。
pub const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 10;

/// 电表定位器。
#[async_trait]
pub trait MeterLocator: Send + Sync {
    async fn locate_meter(&self) -> Result<IpAddr, DiscoveryError>;
}

/// 显示屏定位器。
#[async_trait]
pub trait DisplayLocator: Send + Sync {
    async fn locate_display(&self) -> Result<IpAddr, DiscoveryError>;
}

/// 按去重后的应答地址数量做唯一性判定。
pub fn resolve_candidates(
    candidates: &[IpAddr],
    what: &'static str,
) -> Result<IpAddr, DiscoveryError> {
    let mut distinct: Vec<IpAddr> = Vec::with_capacity(candidates.len());
    for ip in candidates {
        if !distinct.contains(ip) {
            distinct.push(*ip);
        }
    }
    match distinct.as_slice() {
        [] => Err(DiscoveryError::NotFound(what)),
        [only] => Ok(*only),
        _ => Err(DiscoveryError::Ambiguous(distinct)),
    }
}

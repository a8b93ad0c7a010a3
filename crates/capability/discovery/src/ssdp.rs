//! SSDP 搜索定位显示屏。
//!
//! 显示屏从临时端口回复 M-SEARCH，因此接收端不按来源端口过滤，只按报文内容匹配。

use crate::{DiscoveryError, DisplayLocator, resolve_candidates};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

pub const SSDP_MULTICAST: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(239, 255, 255, 250)), 1900);
pub const DISPLAY_SEARCH_TARGET: &str = "urn:schemas-upnp-org:device:LaMetric:1";

/// 应答收集策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SsdpPolicy {
    /// 第一个匹配应答即返回。
    FirstMatch,
    /// 收集到超时，多于一个地址时报歧义。
    #[default]
    DetectAmbiguity,
}

/// SSDP 显示屏定位器。
#[derive(Debug, Clone)]
pub struct SsdpDisplayLocator {
    search_target: String,
    destination: SocketAddr,
    timeout: Duration,
    policy: SsdpPolicy,
}

impl SsdpDisplayLocator {
    pub fn new(timeout: Duration, policy: SsdpPolicy) -> Self {
        Self {
            search_target: DISPLAY_SEARCH_TARGET.to_string(),
            destination: SSDP_MULTICAST,
            timeout,
            policy,
        }
    }

    /// 替换搜索目的地址（测试中指向本地应答器）。
    pub fn with_destination(mut self, destination: SocketAddr) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_search_target(mut self, search_target: impl Into<String>) -> Self {
        self.search_target = search_target.into();
        self
    }

    pub async fn search(&self) -> Result<IpAddr, DiscoveryError> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
        let request = search_request(&self.search_target, self.timeout);
        socket.send_to(request.as_bytes(), self.destination).await?;
        info!(
            search_target = %self.search_target,
            policy = ?self.policy,
            "ssdp_search_sent"
        );

        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut responders: Vec<IpAddr> = Vec::new();
        let mut buf = [0u8; 2048];
        loop {
            let received = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await;
            let (len, from) = match received {
                Err(_) => break,
                Ok(Err(err)) => return Err(DiscoveryError::Io(err)),
                Ok(Ok(received)) => received,
            };
            let text = String::from_utf8_lossy(&buf[..len]);
            if !is_matching_reply(&text, &self.search_target) {
                debug!(from = %from, "ssdp_reply_ignored");
                continue;
            }
            debug!(from = %from, "ssdp_reply_matched");
            if !responders.contains(&from.ip()) {
                responders.push(from.ip());
            }
            if self.policy == SsdpPolicy::FirstMatch {
                break;
            }
        }

        let resolved = resolve_candidates(&responders, "display");
        match &resolved {
            Ok(ip) => info!(ip = %ip, "display discovered"),
            Err(err) => warn!(error = %err, "display discovery failed"),
        }
        resolved
    }
}

#[async_trait]
impl DisplayLocator for SsdpDisplayLocator {
    async fn locate_display(&self) -> Result<IpAddr, DiscoveryError> {
        self.search().await
    }
}

/// 构造 M-SEARCH 报文。
pub fn search_request(search_target: &str, timeout: Duration) -> String {
    let mx = timeout.as_secs().clamp(1, 5);
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: 239.255.255.250:1900\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {mx}\r\n\
         ST: {search_target}\r\n\
         \r\n"
    )
}

/// 应答是否为目标设备：200 状态行，且 ST 或 USN 头携带目标 URN。
pub fn is_matching_reply(reply: &str, search_target: &str) -> bool {
    let mut lines = reply.lines();
    let status_ok = lines
        .next()
        .map(|line| line.starts_with("HTTP/1.1 200") || line.starts_with("NOTIFY"))
        .unwrap_or(false);
    if !status_ok {
        return false;
    }
    let target = search_target.to_ascii_lowercase();
    lines.any(|line| {
        let Some((name, value)) = line.split_once(':') else {
            return false;
        };
        let name = name.trim();
        (name.eq_ignore_ascii_case("ST") || name.eq_ignore_ascii_case("USN"))
            && value.to_ascii_lowercase().contains(&target)
    })
}

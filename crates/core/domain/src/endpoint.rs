use std::fmt;
use std::time::SystemTime;

/// 地址来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointOrigin {
    /// 静态配置。
    Configured,
    /// 通过 mDNS / SSDP 发现，附带发现时间。
    Discovered(SystemTime),
}

/// 网络端点：主机 + 可选端口 + 来源。
///
/// 数据源或输出端同一时刻最多持有一个活动端点；重新发现时整体替换，
/// 从不原地修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: Option<u16>,
    origin: EndpointOrigin,
}

impl Endpoint {
    pub fn configured(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
            origin: EndpointOrigin::Configured,
        }
    }

    pub fn discovered(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
            origin: EndpointOrigin::Discovered(SystemTime::now()),
        }
    }

    /// 解析 `host`、`host:port` 或 `[v6]:port` 形式的配置值。
    pub fn parse_configured(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if let Some(rest) = value.strip_prefix('[') {
            let (host, tail) = rest.split_once(']')?;
            let port = match tail.strip_prefix(':') {
                Some(port) => Some(port.parse().ok()?),
                None if tail.is_empty() => None,
                None => return None,
            };
            return Some(Self::configured(host, port));
        }
        match value.rsplit_once(':') {
            // 单个冒号视为 host:port，多个冒号视为裸 IPv6
            Some((host, port)) if !host.contains(':') => {
                Some(Self::configured(host, Some(port.parse().ok()?)))
            }
            _ => Some(Self::configured(value, None)),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn origin(&self) -> EndpointOrigin {
        self.origin
    }

    pub fn is_discovered(&self) -> bool {
        matches!(self.origin, EndpointOrigin::Discovered(_))
    }

    /// URL 中的 authority 部分（IPv6 加方括号）。
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match self.port {
            Some(port) => format!("{}:{}", host, port),
            None => host,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

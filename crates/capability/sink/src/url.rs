//! 推送地址的主机替换。
//!
//! 只替换 authority 中的主机部分；scheme、userinfo、端口、路径与查询串逐字节保留。

use crate::SinkError;

/// 只有发现结果、没有配置地址时使用的模板。
pub const MINIMAL_URL_TEMPLATE: &str = "http://0.0.0.0:8080/api/v1/dev/widget/update";

/// 主机在 URL 中的字节区间与端口。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HostSpan {
    start: usize,
    end: usize,
    port: Option<u16>,
}

fn host_span(url: &str) -> Result<HostSpan, SinkError> {
    let invalid = || SinkError::InvalidUrl(url.to_string());
    let authority_start = url.find("://").ok_or_else(invalid)? + 3;
    let rest = &url[authority_start..];
    let authority_len = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..authority_len];

    let host_offset = authority.rfind('@').map_or(0, |at| at + 1);
    let host_and_port = &authority[host_offset..];

    let (host_len, port_text) = if host_and_port.starts_with('[') {
        let close = host_and_port.find(']').ok_or_else(invalid)?;
        let tail = &host_and_port[close + 1..];
        match tail.strip_prefix(':') {
            Some(port) => (close + 1, Some(port)),
            None if tail.is_empty() => (close + 1, None),
            None => return Err(invalid()),
        }
    } else {
        match host_and_port.split_once(':') {
            Some((host, port)) => (host.len(), Some(port)),
            None => (host_and_port.len(), None),
        }
    };
    if host_len == 0 {
        return Err(invalid());
    }
    let port = match port_text {
        Some(text) => Some(text.parse().map_err(|_| invalid())?),
        None => None,
    };

    let start = authority_start + host_offset;
    Ok(HostSpan {
        start,
        end: start + host_len,
        port,
    })
}

/// URL 中的主机（去掉 IPv6 方括号）与显式端口。
pub fn host_and_port(url: &str) -> Result<(String, Option<u16>), SinkError> {
    let span = host_span(url)?;
    let host = url[span.start..span.end]
        .trim_start_matches('[')
        .trim_end_matches(']');
    Ok((host.to_string(), span.port))
}

/// 用 `new_host` 替换 URL 中的主机，IPv6 自动加方括号。
pub fn substitute_host(url: &str, new_host: &str) -> Result<String, SinkError> {
    let span = host_span(url)?;
    let host = if new_host.contains(':') {
        format!("[{new_host}]")
    } else {
        new_host.to_string()
    };
    let mut out = String::with_capacity(url.len() + host.len());
    out.push_str(&url[..span.start]);
    out.push_str(&host);
    out.push_str(&url[span.end..]);
    Ok(out)
}

use std::net::IpAddr;

/// 设备发现错误。
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("no {0} found on the local network, configure its address manually")]
    NotFound(&'static str),
    #[error("multiple devices responded ({}), configure the address manually", format_candidates(.0))]
    Ambiguous(Vec<IpAddr>),
    #[error("discovery io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("mdns error: {0}")]
    Mdns(String),
}

fn format_candidates(candidates: &[IpAddr]) -> String {
    candidates
        .iter()
        .map(IpAddr::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

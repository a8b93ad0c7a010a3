use bridge_discovery::DiscoveryError;

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// 缺少凭证、地址或设备路径。
    #[error("configuration error: {0}")]
    Configuration(String),
    /// 网络或串口暂时不可用。
    #[error("connectivity error: {0}")]
    Connectivity(String),
    /// 报文不符合预期的握手或格式。
    #[error("protocol error: {0}")]
    Protocol(String),
    /// 对端明确拒绝（如凭证错误）。
    #[error("rejected by remote: {0}")]
    Rejected(String),
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    /// 连续失败次数达到上限。
    #[error("{source_name} exhausted after {attempts} consecutive failures: {last_error}")]
    Exhausted {
        source_name: &'static str,
        attempts: u32,
        last_error: String,
    },
}

impl IngestError {
    /// 编排层是否应当终止进程。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::Configuration(_)
                | IngestError::Rejected(_)
                | IngestError::Discovery(_)
                | IngestError::Exhausted { .. }
        )
    }
}

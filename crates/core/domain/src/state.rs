use std::fmt;

/// 数据源连接状态。
///
/// `Unconnected → Bootstrapping → Streaming ⇄ Backoff → Exhausted`，
/// `Exhausted` 为终态，由编排层作为致命错误处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Bootstrapping,
    Streaming,
    Backoff,
    Exhausted,
}

impl ConnectionState {
    /// 状态迁移表。
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Exhausted, _) => false,
            (Unconnected, Bootstrapping) => true,
            // 首次建立会话失败时直接进入退避；被对端拒绝时直接终止
            (Bootstrapping, Streaming | Backoff | Exhausted) => true,
            (Streaming, Backoff) => true,
            (Backoff, Streaming | Backoff | Exhausted) => true,
            (Streaming, Exhausted) => true,
            (current, next) => current == next,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Exhausted
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unconnected => "unconnected",
            ConnectionState::Bootstrapping => "bootstrapping",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Backoff => "backoff",
            ConnectionState::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

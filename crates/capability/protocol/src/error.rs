//! 报文错误类型定义

/// 报文完整性错误，整帧丢弃。
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TelegramError {
    /// CRC 不匹配
    #[error("crc mismatch: telegram says {expected:04X}, computed {computed:04X}")]
    CrcMismatch { expected: u16, computed: u16 },

    /// 结束行缺少 4 位十六进制校验值
    #[error("malformed checksum line: {0}")]
    MalformedChecksum(String),

    /// 超过最大报文长度仍未结束
    #[error("telegram exceeds {0} bytes without terminator")]
    Oversized(usize),
}

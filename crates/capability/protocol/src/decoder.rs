//! 按行驱动的报文分帧状态机

use crate::crc::crc16;
use crate::error::TelegramError;
use crate::obis::net_power_watts;
use domain::Reading;
use tracing::debug;

/// 单帧最大字节数，超过即丢弃。
pub const MAX_TELEGRAM_BYTES: usize = 16 * 1024;

/// 分帧状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// 等待 `/` 起始行
    Idle,
    /// 已见起始行，收集数据行
    Collecting,
}

/// 一帧通过 CRC 校验的报文。
#[derive(Debug, Clone, PartialEq)]
pub struct Telegram {
    lines: Vec<String>,
    checksum: u16,
}

impl Telegram {
    /// 去掉行尾后的文本行（含起始行，不含 `!` 结束行）。
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// 报文头，例如 `/ISK5\2M550T-1012`。
    pub fn header(&self) -> Option<&str> {
        self.lines.first().map(String::as_str)
    }

    pub fn net_power_watts(&self) -> Option<f64> {
        net_power_watts(self.lines.iter().map(String::as_str))
    }

    /// 串口报文不带时间戳。
    pub fn to_reading(&self) -> Option<Reading> {
        self.net_power_watts().map(|watts| Reading::new(watts, None))
    }
}

/// DSMR 报文解码器
///
/// 输入为串口读到的原始行（保留 `\r\n`），CRC 按原始字节计算。
#[derive(Debug)]
pub struct TelegramDecoder {
    state: DecoderState,
    raw: Vec<u8>,
    lines: Vec<String>,
}

impl TelegramDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            raw: Vec::with_capacity(1024),
            lines: Vec::new(),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// 丢弃当前缓冲，回到 Idle。
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.raw.clear();
        self.lines.clear();
    }

    /// 喂入一行原始字节。
    ///
    /// 帧未结束返回 `None`；结束行到达后返回校验结果，无论成败都回到 Idle。
    /// 起始行与结束行只看行首；数据行中出现的 `/`、`!` 属于正文。
    pub fn push_line(&mut self, line: &[u8]) -> Option<Result<Telegram, TelegramError>> {
        match self.state {
            DecoderState::Idle => {
                if let Some(start) = start_marker(line) {
                    self.begin(&line[start..]);
                }
                None
            }
            DecoderState::Collecting => match line.first() {
                Some(b'/') => {
                    debug!(discarded_lines = self.lines.len(), "telegram restarted before terminator");
                    self.begin(line);
                    None
                }
                Some(b'!') => {
                    self.raw.push(b'!');
                    let result = self.finish(&line[1..]);
                    self.reset();
                    Some(result)
                }
                _ => {
                    self.append(line);
                    if self.raw.len() > MAX_TELEGRAM_BYTES {
                        self.reset();
                        return Some(Err(TelegramError::Oversized(MAX_TELEGRAM_BYTES)));
                    }
                    None
                }
            },
        }
    }

    fn begin(&mut self, line: &[u8]) {
        self.reset();
        self.state = DecoderState::Collecting;
        self.append(line);
    }

    fn append(&mut self, line: &[u8]) {
        self.raw.extend_from_slice(line);
        let text = String::from_utf8_lossy(line);
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.lines.push(trimmed.to_string());
        }
    }

    fn finish(&mut self, checksum_text: &[u8]) -> Result<Telegram, TelegramError> {
        let text = String::from_utf8_lossy(checksum_text);
        let digits = text.trim();
        let expected = digits
            .get(..4)
            .filter(|hex| hex.chars().all(|c| c.is_ascii_hexdigit()))
            .and_then(|hex| u16::from_str_radix(hex, 16).ok())
            .ok_or_else(|| TelegramError::MalformedChecksum(format!("!{digits}")))?;

        let computed = crc16(&self.raw);
        if computed != expected {
            return Err(TelegramError::CrcMismatch { expected, computed });
        }
        Ok(Telegram {
            lines: std::mem::take(&mut self.lines),
            checksum: expected,
        })
    }
}

/// 空闲时的起始行：跳过串口噪声（不可见字节）后以 `/` 开头。
fn start_marker(line: &[u8]) -> Option<usize> {
    let first = line.iter().position(|b| b.is_ascii_graphic())?;
    (line[first] == b'/').then_some(first)
}

impl Default for TelegramDecoder {
    fn default() -> Self {
        Self::new()
    }
}

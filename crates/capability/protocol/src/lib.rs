//! # 串口协议能力模块
//!
//! P1 口输出 DSMR 文本报文，本模块负责：
//! - **分帧**：按行驱动的状态机，`/` 开始、`!XXXX` 结束
//! - **CRC16 校验**：多项式 0xA001，覆盖 `/` 到 `!`（含）之间的原始字节
//! - **OBIS 解析**：瞬时用电 `1-0:1.7.0` 与瞬时发电 `1-0:2.7.0`
//!
//! ## 数据流
//!
//! ```text
//! 串口原始行 (含 \r\n)
//!       │
//!       ▼
//! TelegramDecoder::push_line
//!       │
//!       ├── Err(TelegramError)  整帧丢弃，回到 Idle
//!       └── Ok(Telegram)
//!             │
//!             ▼
//!       Telegram::to_reading → Option<Reading>
//! ```

mod crc;
mod decoder;
mod error;
mod obis;

pub use crc::crc16;
pub use decoder::{DecoderState, MAX_TELEGRAM_BYTES, Telegram, TelegramDecoder};
pub use error::TelegramError;
pub use obis::{OBIS_CONSUMPTION, OBIS_PRODUCTION, net_power_watts, parse_obis_line};

//! 功率数据接入：统一的 `Source` 抽象与四种数据源。

mod backoff;
pub mod cloud;
mod error;
pub mod http_poll;
pub mod local_ws;
pub mod serial;
mod source;
mod state;
mod websocket;

pub use backoff::{MAX_BACKOFF, exponential_backoff, sleep_or_cancel};
pub use cloud::{CloudWsConfig, CloudWsSource};
pub use error::IngestError;
pub use http_poll::{HttpPollConfig, HttpPollSource};
pub use local_ws::{LocalWsConfig, LocalWsSource};
pub use serial::{SerialConfig, SerialOpener, SerialReader, SerialSource, SystemSerial};
pub use source::{ReadingStream, Source, reading_stream};

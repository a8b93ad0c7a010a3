//! P1 串口 DSMR 报文数据源。

use crate::backoff::sleep_or_cancel;
use crate::state::StateTracker;
use crate::{IngestError, Source};
use async_trait::async_trait;
use bridge_protocol::{Telegram, TelegramDecoder};
use domain::{ConnectionState, Reading};
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SOURCE_NAME: &str = "p1-serial";

/// 串口配置。
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub device: String,
    /// DSMR 4+ 为 115200，DSMR 2/3 为 9600。
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub max_retries: u32,
    /// 读不到报文后的等待。
    pub retry_delay: Duration,
    /// 读错误后的等待（随后重新打开串口）。
    pub reopen_delay: Duration,
}

impl SerialConfig {
    pub fn new(device: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            baud_rate,
            read_timeout: Duration::from_secs(10),
            max_retries: 5,
            retry_delay: Duration::from_secs(1),
            reopen_delay: Duration::from_secs(2),
        }
    }
}

pub type SerialReader = Box<dyn BufRead + Send>;

/// 串口打开方式（测试注入内存数据）。
pub trait SerialOpener: Send + Sync {
    fn open(&self, config: &SerialConfig) -> io::Result<SerialReader>;
}

/// 系统串口：8N1，无流控。
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerial;

impl SerialOpener for SystemSerial {
    fn open(&self, config: &SerialConfig) -> io::Result<SerialReader> {
        let port = serialport::new(config.device.as_str(), config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.read_timeout)
            .open()
            .map_err(io::Error::from)?;
        Ok(Box::new(BufReader::new(port)))
    }
}

/// 一次读报文的结果。
#[derive(Debug)]
enum TelegramRead {
    Telegram(Telegram),
    /// 超时或数据结束，仍未得到有效报文。
    NoData,
    Io(io::Error),
}

/// 阻塞读取一帧有效报文；CRC 失败的帧丢弃后继续读。
fn read_telegram(
    reader: &mut dyn BufRead,
    decoder: &mut TelegramDecoder,
    timeout: Duration,
) -> TelegramRead {
    let deadline = Instant::now() + timeout;
    let mut line = Vec::with_capacity(128);
    loop {
        if Instant::now() >= deadline {
            return TelegramRead::NoData;
        }
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => return TelegramRead::NoData,
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::TimedOut => return TelegramRead::NoData,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return TelegramRead::Io(err),
        }
        match decoder.push_line(&line) {
            Some(Ok(telegram)) => return TelegramRead::Telegram(telegram),
            Some(Err(err)) => {
                warn!(source = SOURCE_NAME, error = %err, "telegram discarded");
                bridge_telemetry::record_telegram_crc_failure();
            }
            None => {}
        }
    }
}

async fn open_port(opener: Arc<dyn SerialOpener>, config: SerialConfig) -> io::Result<SerialReader> {
    tokio::task::spawn_blocking(move || opener.open(&config))
        .await
        .map_err(|err| io::Error::other(err.to_string()))?
}

pub struct SerialSource {
    config: SerialConfig,
    opener: Arc<dyn SerialOpener>,
    reader: Option<SerialReader>,
    decoder: TelegramDecoder,
    state: StateTracker,
    failures: u32,
    pending_delay: Option<Duration>,
}

impl SerialSource {
    pub fn new(config: SerialConfig, opener: Arc<dyn SerialOpener>) -> Self {
        Self {
            config,
            opener,
            reader: None,
            decoder: TelegramDecoder::new(),
            state: StateTracker::new(SOURCE_NAME),
            failures: 0,
            pending_delay: None,
        }
    }

    /// 阻塞读放到 blocking 线程池，读完把串口与解码器交还。
    async fn read_next(&mut self) -> TelegramRead {
        let Some(mut reader) = self.reader.take() else {
            return TelegramRead::Io(io::Error::new(io::ErrorKind::NotConnected, "port not open"));
        };
        let mut decoder = std::mem::take(&mut self.decoder);
        let timeout = self.config.read_timeout;
        let joined = tokio::task::spawn_blocking(move || {
            let outcome = read_telegram(reader.as_mut(), &mut decoder, timeout);
            (reader, decoder, outcome)
        })
        .await;
        match joined {
            Ok((reader, decoder, outcome)) => {
                self.reader = Some(reader);
                self.decoder = decoder;
                outcome
            }
            Err(err) => TelegramRead::Io(io::Error::other(err.to_string())),
        }
    }

    fn register_failure(&mut self, reason: String, delay: Duration) -> Result<(), IngestError> {
        self.failures += 1;
        if self.failures >= self.config.max_retries {
            error!(
                source = SOURCE_NAME,
                attempts = self.failures,
                reason = %reason,
                "max retries exceeded"
            );
            self.state.set(ConnectionState::Exhausted);
            return Err(IngestError::Exhausted {
                source_name: SOURCE_NAME,
                attempts: self.failures,
                last_error: reason,
            });
        }
        warn!(
            source = SOURCE_NAME,
            reason = %reason,
            attempt = self.failures,
            max_retries = self.config.max_retries,
            delay_secs = delay.as_secs_f64(),
            "read failed, retrying"
        );
        self.state.set(ConnectionState::Backoff);
        self.pending_delay = Some(delay);
        Ok(())
    }
}

#[async_trait]
impl Source for SerialSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn connect(&mut self) -> Result<(), IngestError> {
        if self.config.device.trim().is_empty() {
            return Err(IngestError::Configuration("P1_SERIAL_DEVICE not configured".to_string()));
        }
        self.state.set(ConnectionState::Bootstrapping);
        info!(
            source = SOURCE_NAME,
            device = %self.config.device,
            baud_rate = self.config.baud_rate,
            "opening serial port"
        );
        let opened = open_port(Arc::clone(&self.opener), self.config.clone()).await;
        let reader = opened.map_err(|err| {
            error!(source = SOURCE_NAME, device = %self.config.device, error = %err, "cannot open serial port");
            IngestError::Connectivity(format!("cannot open {}: {err}", self.config.device))
        })?;
        self.reader = Some(reader);

        match self.read_next().await {
            TelegramRead::Telegram(telegram) => {
                info!(
                    source = SOURCE_NAME,
                    lines = telegram.lines().len(),
                    header = telegram.header().unwrap_or("-"),
                    "connection successful"
                );
                Ok(())
            }
            TelegramRead::NoData => {
                self.reader = None;
                Err(IngestError::Connectivity(
                    "no telegram received, check cable and meter configuration".to_string(),
                ))
            }
            TelegramRead::Io(err) => {
                self.reader = None;
                Err(IngestError::Connectivity(format!("serial read: {err}")))
            }
        }
    }

    async fn next_reading(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Reading>, IngestError> {
        loop {
            if let Some(delay) = self.pending_delay.take() {
                if !sleep_or_cancel(delay, cancel).await {
                    return Ok(None);
                }
            }
            if cancel.is_cancelled() {
                return Ok(None);
            }

            if self.reader.is_none() {
                match open_port(Arc::clone(&self.opener), self.config.clone()).await {
                    Ok(reader) => {
                        info!(source = SOURCE_NAME, device = %self.config.device, "port reopened");
                        bridge_telemetry::record_reconnect();
                        self.reader = Some(reader);
                    }
                    Err(err) => {
                        self.register_failure(format!("cannot reopen port: {err}"), self.config.reopen_delay)?;
                        continue;
                    }
                }
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                outcome = self.read_next() => outcome,
            };

            match outcome {
                TelegramRead::Telegram(telegram) => match telegram.to_reading() {
                    Some(reading) => {
                        self.failures = 0;
                        self.state.set(ConnectionState::Streaming);
                        bridge_telemetry::record_reading_produced();
                        return Ok(Some(reading));
                    }
                    None => {
                        debug!(source = SOURCE_NAME, "no power data in telegram");
                        bridge_telemetry::record_reading_skipped();
                    }
                },
                TelegramRead::NoData => {
                    self.register_failure("no telegram received".to_string(), self.config.retry_delay)?;
                }
                TelegramRead::Io(err) => {
                    self.reader = None;
                    self.register_failure(format!("serial read: {err}"), self.config.reopen_delay)?;
                }
            }
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }
}

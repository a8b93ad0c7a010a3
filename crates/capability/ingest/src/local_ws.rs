//! 本地电表 v2 WebSocket 数据源。
//!
//! 设备主动发起授权：`authorization_requested` → `authorization` →
//! `authorized` / `error`，授权通过后订阅 `measurement`。

use crate::backoff::sleep_or_cancel;
use crate::state::StateTracker;
use crate::websocket::{self, WsStream};
use crate::{IngestError, Source};
use api_contract::{DeviceClientMessage, DeviceMessage};
use async_trait::async_trait;
use bridge_discovery::MeterLocator;
use domain::{ConnectionState, Endpoint, Reading};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SOURCE_NAME: &str = "homewizard-v2";
const WS_PATH: &str = "/api/ws";
const MEASUREMENT_TOPIC: &str = "measurement";

/// v2 WebSocket 配置。
#[derive(Debug, Clone)]
pub struct LocalWsConfig {
    /// 未配置时在 connect 阶段通过 mDNS 发现。
    pub host: Option<String>,
    pub token: Option<String>,
    /// 设备使用自签名证书；关闭时走明文 ws。
    pub tls: bool,
    pub handshake_timeout: Duration,
    pub reconnect_delay: Duration,
    /// 连续失败达到该次数后重新发现。
    pub rediscover_after: u32,
}

impl Default for LocalWsConfig {
    fn default() -> Self {
        Self {
            host: None,
            token: None,
            tls: true,
            handshake_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
            rediscover_after: 3,
        }
    }
}

pub struct LocalWsSource {
    config: LocalWsConfig,
    locator: Arc<dyn MeterLocator>,
    endpoint: Option<Endpoint>,
    socket: Option<WsStream>,
    state: StateTracker,
    failures: u32,
    pending_delay: Option<Duration>,
}

impl LocalWsSource {
    pub fn new(config: LocalWsConfig, locator: Arc<dyn MeterLocator>) -> Self {
        Self {
            config,
            locator,
            endpoint: None,
            socket: None,
            state: StateTracker::new(SOURCE_NAME),
            failures: 0,
            pending_delay: None,
        }
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    fn token(&self) -> Result<&str, IngestError> {
        self.config
            .token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| IngestError::Configuration("HOMEWIZARD_TOKEN not configured".to_string()))
    }

    fn url(&self) -> Result<String, IngestError> {
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| IngestError::Configuration("next_reading called before connect".to_string()))?;
        let scheme = if self.config.tls { "wss" } else { "ws" };
        Ok(format!("{scheme}://{}{}", endpoint.authority(), WS_PATH))
    }

    fn register_failure(&mut self, err: &IngestError) {
        self.socket = None;
        self.failures += 1;
        warn!(
            source = SOURCE_NAME,
            error = %err,
            failures = self.failures,
            rediscover_after = self.config.rediscover_after,
            "session failed"
        );
        bridge_telemetry::record_reconnect();
        self.state.set(ConnectionState::Backoff);
        self.pending_delay = Some(self.config.reconnect_delay);
    }

    /// 连续失败达到阈值后重新发现；等待中被取消时返回 `false`。
    async fn rediscover_if_due(&mut self, cancel: &CancellationToken) -> bool {
        if self.failures < self.config.rediscover_after {
            return true;
        }
        warn!(
            source = SOURCE_NAME,
            failures = self.failures,
            "attempting rediscovery"
        );
        bridge_telemetry::record_rediscovery();
        let locator = Arc::clone(&self.locator);
        let located = tokio::select! {
            _ = cancel.cancelled() => return false,
            located = locator.locate_meter() => located,
        };
        match located {
            Ok(ip) => self.apply_rediscovery(ip),
            Err(err) => warn!(source = SOURCE_NAME, error = %err, "rediscovery failed"),
        }
        true
    }

    /// 用新发现的地址替换端点，端口沿用。
    fn apply_rediscovery(&mut self, located: std::net::IpAddr) {
        let host = located.to_string();
        let port = self.endpoint.as_ref().and_then(Endpoint::port);
        let current = self.endpoint.as_ref().map(Endpoint::host);
        if current == Some(host.as_str()) {
            debug!(source = SOURCE_NAME, host = %host, "rediscovery found same address");
            return;
        }
        info!(
            source = SOURCE_NAME,
            from = current.unwrap_or("-"),
            to = %host,
            "device address changed"
        );
        self.endpoint = Some(Endpoint::discovered(host, port));
        self.failures = 0;
    }
}

async fn open_session(
    url: &str,
    token: &str,
    config: &LocalWsConfig,
) -> Result<WsStream, IngestError> {
    let request = websocket::build_request(url, &[])?;
    let tls = if config.tls {
        Some(websocket::insecure_tls_connector()?)
    } else {
        None
    };
    let mut socket = websocket::open(request, tls).await?;
    let timeout = config.handshake_timeout;

    let first = websocket::next_text_within(&mut socket, timeout).await?;
    match parse_device_message(&first)? {
        DeviceMessage::AuthorizationRequested { data } => {
            info!(
                source = SOURCE_NAME,
                api_version = data.api_version.as_deref().unwrap_or("unknown"),
                "device requests authorization"
            );
        }
        other => {
            return Err(IngestError::Protocol(format!(
                "expected authorization_requested, got {other:?}"
            )));
        }
    }

    let authorization = DeviceClientMessage::Authorization(token.to_string());
    websocket::send_json(&mut socket, &authorization).await?;

    let second = websocket::next_text_within(&mut socket, timeout).await?;
    match parse_device_message(&second)? {
        DeviceMessage::Authorized => info!(source = SOURCE_NAME, "authentication successful"),
        DeviceMessage::Error { data } => {
            let reason = data.error.unwrap_or_else(|| "unknown error".to_string());
            error!(source = SOURCE_NAME, reason = %reason, "authentication failed");
            return Err(IngestError::Rejected(reason));
        }
        other => {
            return Err(IngestError::Protocol(format!(
                "unexpected authorization response {other:?}"
            )));
        }
    }

    let subscribe = DeviceClientMessage::Subscribe(MEASUREMENT_TOPIC.to_string());
    websocket::send_json(&mut socket, &subscribe).await?;
    info!(source = SOURCE_NAME, "subscribed to measurement updates");
    Ok(socket)
}

fn parse_device_message(text: &str) -> Result<DeviceMessage, IngestError> {
    serde_json::from_str(text).map_err(|err| IngestError::Protocol(format!("bad message: {err}")))
}

#[async_trait]
impl Source for LocalWsSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn connect(&mut self) -> Result<(), IngestError> {
        self.state.set(ConnectionState::Bootstrapping);
        let endpoint = match self.config.host.as_deref() {
            Some(host) => Endpoint::parse_configured(host).ok_or_else(|| {
                IngestError::Configuration(format!("invalid HOMEWIZARD_HOST: {host}"))
            })?,
            None => {
                info!(source = SOURCE_NAME, "no host configured, discovering meter");
                let ip = self.locator.locate_meter().await?;
                info!(source = SOURCE_NAME, ip = %ip, "meter discovered");
                Endpoint::discovered(ip.to_string(), None)
            }
        };
        self.endpoint = Some(endpoint);
        self.token()?;
        info!(source = SOURCE_NAME, url = %self.url()?, "websocket prepared");
        Ok(())
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

            if self.socket.is_none() {
                let url = self.url()?;
                let token = self.token()?.to_string();
                let config = self.config.clone();
                let opened = tokio::select! {
                    _ = cancel.cancelled() => return Ok(None),
                    opened = open_session(&url, &token, &config) => opened,
                };
                match opened {
                    Ok(socket) => {
                        self.socket = Some(socket);
                        self.state.set(ConnectionState::Streaming);
                    }
                    Err(err) if err.is_fatal() => {
                        self.state.set(ConnectionState::Exhausted);
                        return Err(err);
                    }
                    Err(err) => {
                        self.register_failure(&err);
                        if !self.rediscover_if_due(cancel).await {
                            return Ok(None);
                        }
                        continue;
                    }
                }
            }

            let Some(socket) = self.socket.as_mut() else {
                continue;
            };
            let received = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                received = websocket::next_text(socket) => received,
            };
            let text = match received {
                Ok(text) => text,
                Err(err) => {
                    self.register_failure(&err);
                    if !self.rediscover_if_due(cancel).await {
                        return Ok(None);
                    }
                    continue;
                }
            };

            match parse_device_message(&text) {
                Ok(DeviceMessage::Measurement { data }) => match data.power_w {
                    Some(power) => {
                        self.failures = 0;
                        bridge_telemetry::record_reading_produced();
                        return Ok(Some(Reading::new(power, data.timestamp_text())));
                    }
                    None => {
                        debug!(source = SOURCE_NAME, "measurement missing power_w");
                        bridge_telemetry::record_reading_skipped();
                    }
                },
                Ok(DeviceMessage::Error { data }) => {
                    error!(
                        source = SOURCE_NAME,
                        reason = data.error.as_deref().unwrap_or("unknown"),
                        "stream error"
                    );
                }
                Ok(other) => debug!(source = SOURCE_NAME, message = ?other, "message ignored"),
                Err(err) => warn!(source = SOURCE_NAME, error = %err, "message skipped"),
            }
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }
}

//! 云端 GraphQL 订阅数据源（graphql-transport-ws）。

use crate::backoff::sleep_or_cancel;
use crate::state::StateTracker;
use crate::websocket::{self, WsStream};
use crate::{IngestError, Source};
use api_contract::cloud::{InitPayload, SubscribePayload};
use api_contract::{BootstrapResponse, CloudClientMessage, CloudServerMessage, GraphQlRequest};
use async_trait::async_trait;
use async_tungstenite::tungstenite::Message;
use domain::{ConnectionState, Reading};
use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::USER_AGENT;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SOURCE_NAME: &str = "tibber";
const SUBPROTOCOL: &str = "graphql-transport-ws";
const SUBSCRIPTION_ID: &str = "1";
const BOOTSTRAP_QUERY: &str = "{ viewer { websocketSubscriptionUrl homes { id appNickname features { realTimeConsumptionEnabled } } } }";

/// 云端数据源配置。
#[derive(Debug, Clone)]
pub struct CloudWsConfig {
    pub token: Option<String>,
    pub endpoint: String,
    pub user_agent: String,
    pub bootstrap_timeout: Duration,
    pub handshake_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl CloudWsConfig {
    pub fn new(token: Option<String>, endpoint: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            token,
            endpoint: endpoint.into(),
            user_agent: user_agent.into(),
            bootstrap_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// 引导得到的订阅目标。
#[derive(Debug, Clone)]
struct Subscription {
    url: String,
    home_id: String,
}

pub struct CloudWsSource {
    config: CloudWsConfig,
    http: reqwest::Client,
    state: StateTracker,
    subscription: Option<Subscription>,
    socket: Option<WsStream>,
    pending_delay: Option<Duration>,
}

enum Inbound {
    Reading(Reading),
    Continue,
    Pong,
    Complete,
}

impl CloudWsSource {
    pub fn new(config: CloudWsConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            state: StateTracker::new(SOURCE_NAME),
            subscription: None,
            socket: None,
            pending_delay: None,
        }
    }

    fn token(&self) -> Result<&str, IngestError> {
        self.config
            .token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| IngestError::Configuration("TIBBER_TOKEN not configured".to_string()))
    }

    fn schedule_reconnect(&mut self, reason: &str) {
        self.socket = None;
        warn!(
            source = SOURCE_NAME,
            reason,
            delay_secs = self.config.reconnect_delay.as_secs_f64(),
            "session ended, reconnecting"
        );
        bridge_telemetry::record_reconnect();
        self.state.set(ConnectionState::Backoff);
        self.pending_delay = Some(self.config.reconnect_delay);
    }
}

async fn bootstrap(
    http: &reqwest::Client,
    config: &CloudWsConfig,
    token: &str,
) -> Result<Subscription, IngestError> {
    let response = http
        .post(&config.endpoint)
        .bearer_auth(token)
        .header(USER_AGENT, &config.user_agent)
        .timeout(config.bootstrap_timeout)
        .json(&GraphQlRequest {
            query: BOOTSTRAP_QUERY,
        })
        .send()
        .await
        .map_err(|err| IngestError::Connectivity(format!("bootstrap request: {err}")))?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(IngestError::Rejected(format!("bootstrap returned HTTP {status}")));
    }
    if !status.is_success() {
        return Err(IngestError::Connectivity(format!("bootstrap returned HTTP {status}")));
    }
    let body: BootstrapResponse = response
        .json()
        .await
        .map_err(|err| IngestError::Protocol(format!("bootstrap body: {err}")))?;

    let url = body.subscription_url().ok_or_else(|| {
        IngestError::Configuration("no websocket subscription url received".to_string())
    })?;
    let home = body.first_real_time_home().ok_or_else(|| {
        IngestError::Configuration("no home with real-time consumption enabled found".to_string())
    })?;
    info!(
        home = home.app_nickname.as_deref().unwrap_or("Home"),
        home_id = %home.id,
        "cloud home selected"
    );
    Ok(Subscription {
        url: url.to_string(),
        home_id: home.id.clone(),
    })
}

/// 建立会话：init → ack → subscribe。
async fn open_session(
    config: &CloudWsConfig,
    token: &str,
    subscription: &Subscription,
) -> Result<WsStream, IngestError> {
    let request = websocket::build_request(
        &subscription.url,
        &[
            ("Sec-WebSocket-Protocol", SUBPROTOCOL),
            ("User-Agent", config.user_agent.as_str()),
        ],
    )?;
    let mut socket = websocket::open(request, None).await?;

    let init = CloudClientMessage::ConnectionInit {
        payload: InitPayload {
            token: token.to_string(),
        },
    };
    websocket::send_json(&mut socket, &init).await?;

    loop {
        let text = websocket::next_text_within(&mut socket, config.handshake_timeout).await?;
        match parse_server_message(&text)? {
            CloudServerMessage::ConnectionAck => {
                info!(source = SOURCE_NAME, "connection acknowledged");
                break;
            }
            CloudServerMessage::ConnectionError { payload } => {
                let detail = payload.map(|value| value.to_string()).unwrap_or_default();
                error!(source = SOURCE_NAME, detail = %detail, "connection rejected");
                return Err(IngestError::Rejected(format!("connection_error {detail}")));
            }
            CloudServerMessage::Ping => {
                websocket::send_json(&mut socket, &CloudClientMessage::Pong).await?;
            }
            other => debug!(source = SOURCE_NAME, message = ?other, "ignored before ack"),
        }
    }

    let subscribe = CloudClientMessage::Subscribe {
        id: SUBSCRIPTION_ID.to_string(),
        payload: SubscribePayload {
            query: subscription_query(&subscription.home_id),
        },
    };
    websocket::send_json(&mut socket, &subscribe).await?;
    info!(source = SOURCE_NAME, "subscription started");
    Ok(socket)
}

fn parse_server_message(text: &str) -> Result<CloudServerMessage, IngestError> {
    serde_json::from_str(text).map_err(|err| IngestError::Protocol(format!("bad message: {err}")))
}

fn subscription_query(home_id: &str) -> String {
    format!("subscription {{ liveMeasurement(homeId: \"{home_id}\") {{ timestamp power }} }}")
}

fn classify(text: &str) -> Inbound {
    let message = match parse_server_message(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(source = SOURCE_NAME, error = %err, "message skipped");
            return Inbound::Continue;
        }
    };
    match message {
        CloudServerMessage::Next { payload } => {
            let Some(measurement) = payload.live_measurement() else {
                debug!(source = SOURCE_NAME, "next without liveMeasurement");
                bridge_telemetry::record_reading_skipped();
                return Inbound::Continue;
            };
            match measurement.power {
                Some(power) => Inbound::Reading(Reading::new(power, measurement.timestamp.clone())),
                None => {
                    debug!(source = SOURCE_NAME, "measurement missing power");
                    bridge_telemetry::record_reading_skipped();
                    Inbound::Continue
                }
            }
        }
        CloudServerMessage::Error { payload } => {
            error!(
                source = SOURCE_NAME,
                detail = %payload.map(|value| value.to_string()).unwrap_or_default(),
                "stream error"
            );
            Inbound::Continue
        }
        CloudServerMessage::Complete => Inbound::Complete,
        CloudServerMessage::Ping => Inbound::Pong,
        other => {
            debug!(source = SOURCE_NAME, message = ?other, "message ignored");
            Inbound::Continue
        }
    }
}

#[async_trait]
impl Source for CloudWsSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn connect(&mut self) -> Result<(), IngestError> {
        self.state.set(ConnectionState::Bootstrapping);
        let token = self.token()?;
        let subscription = bootstrap(&self.http, &self.config, token).await?;
        info!(source = SOURCE_NAME, url = %subscription.url, "bootstrap complete");
        self.subscription = Some(subscription);
        Ok(())
    }

    async fn next_reading(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Reading>, IngestError> {
        let subscription = self
            .subscription
            .clone()
            .ok_or_else(|| IngestError::Configuration("next_reading called before connect".to_string()))?;
        let token = self.token()?.to_string();
        let config = self.config.clone();

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
                let opened = tokio::select! {
                    _ = cancel.cancelled() => return Ok(None),
                    opened = open_session(&config, &token, &subscription) => opened,
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
                        self.schedule_reconnect(&err.to_string());
                        continue;
                    }
                }
            }

            let Some(socket) = self.socket.as_mut() else {
                continue;
            };
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                frame = socket.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => match classify(text.as_str()) {
                    Inbound::Reading(reading) => {
                        bridge_telemetry::record_reading_produced();
                        return Ok(Some(reading));
                    }
                    Inbound::Continue => {}
                    Inbound::Pong => {
                        if let Err(err) = websocket::send_json(socket, &CloudClientMessage::Pong).await {
                            self.schedule_reconnect(&err.to_string());
                        }
                    }
                    Inbound::Complete => {
                        info!(source = SOURCE_NAME, "server completed the stream");
                        self.schedule_reconnect("complete");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    self.schedule_reconnect(&format!("closed by server: {frame:?}"));
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => self.schedule_reconnect(&err.to_string()),
                None => self.schedule_reconnect("connection closed"),
            }
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_query_names_home_and_fields() {
        let query = subscription_query("home-1");
        assert!(query.contains("liveMeasurement(homeId: \"home-1\")"));
        assert!(query.contains("timestamp power"));
    }

    #[test]
    fn next_with_power_becomes_reading() {
        let text = r#"{"id":"1","type":"next","payload":{"data":{"liveMeasurement":{"timestamp":"2025-01-01T12:00:00+01:00","power":812.0}}}}"#;
        match classify(text) {
            Inbound::Reading(reading) => {
                assert_eq!(reading.power_watts(), 812.0);
                assert_eq!(reading.timestamp(), Some("2025-01-01T12:00:00+01:00"));
            }
            _ => panic!("expected reading"),
        }
    }

    #[test]
    fn next_without_power_is_skipped() {
        let text = r#"{"id":"1","type":"next","payload":{"data":{"liveMeasurement":{"timestamp":"t"}}}}"#;
        assert!(matches!(classify(text), Inbound::Continue));
    }

    #[test]
    fn complete_and_ping_are_classified() {
        assert!(matches!(classify(r#"{"id":"1","type":"complete"}"#), Inbound::Complete));
        assert!(matches!(classify(r#"{"type":"ping"}"#), Inbound::Pong));
        assert!(matches!(classify("not json"), Inbound::Continue));
    }
}

//! 本地电表 v1 HTTP 轮询数据源。

use crate::backoff::{MAX_BACKOFF, exponential_backoff, sleep_or_cancel};
use crate::state::StateTracker;
use crate::{IngestError, Source};
use api_contract::P1DataResponse;
use async_trait::async_trait;
use bridge_discovery::MeterLocator;
use domain::{ConnectionState, Endpoint, Reading};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SOURCE_NAME: &str = "homewizard-p1";
const DATA_PATH: &str = "/api/v1/data";

/// 轮询配置。
#[derive(Debug, Clone)]
pub struct HttpPollConfig {
    /// 未配置时通过 mDNS 发现。
    pub host: Option<String>,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
}

impl Default for HttpPollConfig {
    fn default() -> Self {
        Self {
            host: None,
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }
}

/// 单次轮询结果。
#[derive(Debug)]
enum PollOutcome {
    Power(f64),
    MissingField,
    Busy(StatusCode),
    Failed(IngestError),
}

pub struct HttpPollSource {
    config: HttpPollConfig,
    locator: Arc<dyn MeterLocator>,
    client: Option<reqwest::Client>,
    endpoint: Option<Endpoint>,
    state: StateTracker,
    failures: u32,
    pending_delay: Option<Duration>,
}

impl HttpPollSource {
    pub fn new(config: HttpPollConfig, locator: Arc<dyn MeterLocator>) -> Self {
        Self {
            config,
            locator,
            client: None,
            endpoint: None,
            state: StateTracker::new(SOURCE_NAME),
            failures: 0,
            pending_delay: None,
        }
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    fn url(&self) -> Result<String, IngestError> {
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| IngestError::Configuration("next_reading called before connect".to_string()))?;
        Ok(format!("http://{}{}", endpoint.authority(), DATA_PATH))
    }

    async fn resolve_endpoint(&self) -> Result<Endpoint, IngestError> {
        if let Some(host) = self.config.host.as_deref() {
            return Endpoint::parse_configured(host).ok_or_else(|| {
                IngestError::Configuration(format!("invalid HOMEWIZARD_P1_HOST: {host}"))
            });
        }
        info!(source = SOURCE_NAME, "no host configured, discovering meter");
        let ip = self.locator.locate_meter().await?;
        Ok(Endpoint::discovered(ip.to_string(), None))
    }

    async fn poll_once(&self, client: &reqwest::Client, url: &str) -> PollOutcome {
        let response = match client.get(url).send().await {
            Ok(response) => response,
            Err(err) if err.is_connect() => {
                return PollOutcome::Failed(IngestError::Connectivity(format!(
                    "cannot reach device: {err}"
                )));
            }
            Err(err) => return PollOutcome::Failed(IngestError::Connectivity(err.to_string())),
        };
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            return PollOutcome::Busy(status);
        }
        if !status.is_success() {
            return PollOutcome::Failed(IngestError::Protocol(format!("HTTP {status}")));
        }
        match response.json::<P1DataResponse>().await {
            Ok(P1DataResponse {
                active_power_w: Some(power),
            }) => PollOutcome::Power(power),
            Ok(_) => PollOutcome::MissingField,
            Err(err) => PollOutcome::Failed(IngestError::Protocol(format!("bad payload: {err}"))),
        }
    }

    fn backoff_delay(&self) -> Duration {
        exponential_backoff(self.config.poll_interval, self.failures, MAX_BACKOFF)
    }
}

#[async_trait]
impl Source for HttpPollSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn connect(&mut self) -> Result<(), IngestError> {
        self.state.set(ConnectionState::Bootstrapping);
        let endpoint = self.resolve_endpoint().await?;
        self.endpoint = Some(endpoint);

        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|err| IngestError::Configuration(format!("http client: {err}")))?;
        let url = self.url()?;
        info!(source = SOURCE_NAME, url = %url, "testing connection");

        match self.poll_once(&client, &url).await {
            PollOutcome::Power(power) => {
                info!(source = SOURCE_NAME, power_w = power, "connection successful");
            }
            PollOutcome::MissingField => {
                warn!(
                    source = SOURCE_NAME,
                    "response missing active_power_w, device may not be a P1 meter or has no meter data yet"
                );
            }
            PollOutcome::Busy(status) => {
                error!(source = SOURCE_NAME, status = %status, "bootstrap failed");
                return Err(IngestError::Connectivity(format!("device busy: HTTP {status}")));
            }
            PollOutcome::Failed(err) => {
                error!(source = SOURCE_NAME, error = %err, "bootstrap failed");
                return Err(err);
            }
        }

        self.client = Some(client);
        Ok(())
    }

    async fn next_reading(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Reading>, IngestError> {
        let client = self
            .client
            .clone()
            .ok_or_else(|| IngestError::Configuration("next_reading called before connect".to_string()))?;
        let url = self.url()?;

        loop {
            if let Some(delay) = self.pending_delay.take() {
                if !sleep_or_cancel(delay, cancel).await {
                    return Ok(None);
                }
            }
            if cancel.is_cancelled() {
                return Ok(None);
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                outcome = self.poll_once(&client, &url) => outcome,
            };

            match outcome {
                PollOutcome::Power(power) => {
                    self.failures = 0;
                    self.state.set(ConnectionState::Streaming);
                    self.pending_delay = Some(self.config.poll_interval);
                    bridge_telemetry::record_reading_produced();
                    return Ok(Some(Reading::new(power, None)));
                }
                PollOutcome::MissingField => {
                    debug!(source = SOURCE_NAME, "active_power_w not in response");
                    bridge_telemetry::record_reading_skipped();
                    self.pending_delay = Some(self.config.poll_interval);
                }
                PollOutcome::Busy(status) => {
                    self.failures += 1;
                    let delay = self.backoff_delay();
                    warn!(
                        source = SOURCE_NAME,
                        status = %status,
                        delay_secs = delay.as_secs_f64(),
                        "device busy, backing off"
                    );
                    self.state.set(ConnectionState::Backoff);
                    self.pending_delay = Some(delay);
                }
                PollOutcome::Failed(err) => {
                    self.failures += 1;
                    if self.failures >= self.config.max_retries {
                        error!(
                            source = SOURCE_NAME,
                            attempts = self.failures,
                            error = %err,
                            "max retries exceeded"
                        );
                        self.state.set(ConnectionState::Exhausted);
                        return Err(IngestError::Exhausted {
                            source_name: SOURCE_NAME,
                            attempts: self.failures,
                            last_error: err.to_string(),
                        });
                    }
                    let delay = self.backoff_delay();
                    warn!(
                        source = SOURCE_NAME,
                        error = %err,
                        attempt = self.failures,
                        max_retries = self.config.max_retries,
                        delay_secs = delay.as_secs_f64(),
                        "poll failed, retrying"
                    );
                    bridge_telemetry::record_reconnect();
                    self.state.set(ConnectionState::Backoff);
                    self.pending_delay = Some(delay);
                }
            }
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }
}

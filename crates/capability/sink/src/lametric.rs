use crate::format::{reading_frame, stale_frame};
use crate::url::{MINIMAL_URL_TEMPLATE, host_and_port, substitute_host};
use crate::{Sink, SinkError};
use api_contract::display::FramePayload;
use async_trait::async_trait;
use bridge_discovery::DisplayLocator;
use domain::{Endpoint, Reading};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 本地推送接口的 Basic 认证用户名。
const AUTH_USER: &str = "dev";

/// 显示屏推送配置。
#[derive(Debug, Clone)]
pub struct LaMetricConfig {
    /// 完整推送地址；未配置时仅靠发现结果拼出最小地址。
    pub url: Option<String>,
    pub api_key: String,
    /// 是否通过 SSDP 定位显示屏并替换 URL 中的主机。
    pub discover: bool,
    pub request_timeout: Duration,
}

impl LaMetricConfig {
    pub fn new(url: Option<String>, api_key: impl Into<String>, discover: bool) -> Self {
        Self {
            url,
            api_key: api_key.into(),
            discover,
            request_timeout: Duration::from_secs(2),
        }
    }
}

/// 当前推送目标。
#[derive(Debug, Clone)]
struct Target {
    endpoint: Endpoint,
    url: String,
}

/// 通过本地 HTTP 接口推送单帧的显示屏输出端。
///
/// 发现得到的地址缓存在实例内；对已发现地址的连接被拒绝时，
/// 重新发现一次并重试一次。
pub struct LaMetricSink {
    config: LaMetricConfig,
    template: String,
    /// 发现失败时的静态回退地址。
    configured: Option<Target>,
    client: reqwest::Client,
    locator: Arc<dyn DisplayLocator>,
    target: Mutex<Option<Target>>,
}

impl LaMetricSink {
    pub fn new(
        config: LaMetricConfig,
        locator: Arc<dyn DisplayLocator>,
    ) -> Result<Self, SinkError> {
        if config.api_key.trim().is_empty() {
            return Err(SinkError::Configuration("LAMETRIC_API_KEY is not set".into()));
        }
        let template = match (&config.url, config.discover) {
            (Some(url), _) => url.clone(),
            (None, true) => MINIMAL_URL_TEMPLATE.to_string(),
            (None, false) => {
                return Err(SinkError::Configuration(
                    "LAMETRIC_URL is not set and discovery is disabled".into(),
                ));
            }
        };
        let (host, port) = host_and_port(&template)?;
        let configured = config.url.as_ref().map(|url| Target {
            endpoint: Endpoint::configured(host, port),
            url: url.clone(),
        });
        let target = if config.discover {
            None
        } else {
            configured.clone()
        };

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| SinkError::Configuration(err.to_string()))?;

        Ok(Self {
            config,
            template,
            configured,
            client,
            locator,
            target: Mutex::new(target),
        })
    }

    /// 当前缓存的目标端点（尚未发现时为 `None`）。
    pub async fn endpoint(&self) -> Option<Endpoint> {
        self.target
            .lock()
            .await
            .as_ref()
            .map(|target| target.endpoint.clone())
    }

    async fn discover(&self) -> Result<Target, SinkError> {
        let ip = self.locator.locate_display().await?;
        let host = ip.to_string();
        let url = substitute_host(&self.template, &host)?;
        let (_, port) = host_and_port(&url)?;
        let endpoint = Endpoint::discovered(host, port);
        info!(endpoint = %endpoint, "display discovered");
        Ok(Target { endpoint, url })
    }

    /// 锁只用于读写缓存，发现期间不持有，避免阻塞并发推送。
    async fn current_target(&self) -> Result<Target, SinkError> {
        if let Some(target) = self.target.lock().await.clone() {
            return Ok(target);
        }
        let target = match self.discover().await {
            Ok(target) => target,
            Err(err) => {
                let Some(fallback) = self.configured.clone() else {
                    return Err(err);
                };
                // 不缓存回退地址，下次推送仍先尝试发现
                warn!(error = %err, url = %fallback.url, "display discovery failed, using configured url");
                return Ok(fallback);
            }
        };
        let mut cached = self.target.lock().await;
        // 并发发现已先写入时沿用先到的结果
        Ok(cached.get_or_insert(target).clone())
    }

    async fn rediscover(&self, stale: &Endpoint) -> Result<Target, SinkError> {
        bridge_telemetry::record_rediscovery();
        warn!(endpoint = %stale, "display refused connection, rediscovering");
        // 失败时丢弃旧地址，下次推送重新发现
        self.target.lock().await.take();
        let target = self.discover().await?;
        *self.target.lock().await = Some(target.clone());
        Ok(target)
    }

    async fn post(&self, url: &str, payload: &FramePayload) -> Result<(), SinkError> {
        let response = self
            .client
            .post(url)
            .basic_auth(AUTH_USER, Some(&self.config.api_key))
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() {
                    SinkError::Connect(err.to_string())
                } else {
                    SinkError::Http(err.to_string())
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }
        Ok(())
    }

    async fn send(&self, payload: FramePayload) -> Result<(), SinkError> {
        let target = self.current_target().await?;
        match self.post(&target.url, &payload).await {
            Err(SinkError::Connect(reason)) if target.endpoint.is_discovered() => {
                debug!(reason = %reason, "display connect failed");
                let target = self.rediscover(&target.endpoint).await?;
                self.post(&target.url, &payload).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl Sink for LaMetricSink {
    async fn push(&self, reading: &Reading) -> Result<(), SinkError> {
        debug!(power_watts = reading.power_watts(), "display push");
        self.send(reading_frame(reading)).await
    }

    async fn push_stale(&self) -> Result<(), SinkError> {
        self.send(stale_frame()).await
    }
}

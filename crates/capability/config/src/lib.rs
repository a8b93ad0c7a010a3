//! 桥接进程运行配置加载。

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 可选的功率数据源。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// 云端 GraphQL 订阅。
    Tibber,
    /// 本地 v1 HTTP 轮询。
    HomeWizardP1,
    /// 本地 v2 WebSocket。
    HomeWizardV2,
    /// P1 串口 DSMR 报文。
    P1Serial,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Tibber,
        SourceKind::HomeWizardP1,
        SourceKind::HomeWizardV2,
        SourceKind::P1Serial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Tibber => "tibber",
            SourceKind::HomeWizardP1 => "homewizard-p1",
            SourceKind::HomeWizardV2 => "homewizard-v2",
            SourceKind::P1Serial => "p1-serial",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ConfigError::Invalid("BRIDGE_SOURCE".to_string(), value.to_string()))
    }
}

/// 云端数据源配置。
#[derive(Debug, Clone)]
pub struct TibberSettings {
    pub token: Option<String>,
    pub endpoint: String,
    pub user_agent: String,
}

/// 本地电表配置（v1 轮询与 v2 WebSocket 共用）。
#[derive(Debug, Clone)]
pub struct HomeWizardSettings {
    pub p1_host: Option<String>,
    pub host: Option<String>,
    pub token: Option<String>,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
    pub max_retries: u32,
}

/// 串口配置。
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub device: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub max_retries: u32,
}

/// 显示屏配置。
#[derive(Debug, Clone)]
pub struct LaMetricSettings {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub discover: bool,
    pub ssdp_first_match: bool,
}

/// 桥接进程运行配置。
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub source: SourceKind,
    pub tibber: TibberSettings,
    pub homewizard: HomeWizardSettings,
    pub serial: SerialSettings,
    pub lametric: LaMetricSettings,
    pub discovery_timeout: Duration,
    pub stale_timeout: Duration,
    pub stale_check_interval: Duration,
}

impl BridgeConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let source = match read_optional("BRIDGE_SOURCE") {
            Some(value) => value.parse()?,
            None => SourceKind::Tibber,
        };

        let tibber = TibberSettings {
            token: read_optional("TIBBER_TOKEN"),
            endpoint: env::var("TIBBER_ENDPOINT")
                .unwrap_or_else(|_| "https://api.tibber.com/v1-beta/gql".to_string()),
            user_agent: env::var("TIBBER_USER_AGENT")
                .unwrap_or_else(|_| format!("power-bridge/{}", env!("CARGO_PKG_VERSION"))),
        };

        let homewizard = HomeWizardSettings {
            p1_host: read_optional("HOMEWIZARD_P1_HOST"),
            host: read_optional("HOMEWIZARD_HOST"),
            token: read_optional("HOMEWIZARD_TOKEN"),
            poll_interval: Duration::from_millis(read_u64_with_default(
                "HOMEWIZARD_POLL_INTERVAL_MS",
                1000,
            )?),
            http_timeout: Duration::from_millis(read_u64_with_default(
                "HOMEWIZARD_HTTP_TIMEOUT_MS",
                5000,
            )?),
            max_retries: read_u32_with_default("HOMEWIZARD_MAX_RETRIES", 3)?,
        };

        let serial = SerialSettings {
            device: env::var("P1_SERIAL_DEVICE").unwrap_or_else(|_| "/dev/ttyUSB0".to_string()),
            baud_rate: read_u32_with_default("P1_SERIAL_BAUDRATE", 115_200)?,
            read_timeout: Duration::from_secs(read_u64_with_default(
                "P1_SERIAL_TIMEOUT_SECONDS",
                10,
            )?),
            max_retries: read_u32_with_default("P1_SERIAL_MAX_RETRIES", 5)?,
        };

        let lametric_url = read_optional("LAMETRIC_URL");
        let lametric = LaMetricSettings {
            discover: read_bool_with_default("LAMETRIC_DISCOVER", lametric_url.is_none()),
            url: lametric_url,
            api_key: read_optional("LAMETRIC_API_KEY"),
            ssdp_first_match: read_bool_with_default("LAMETRIC_SSDP_FIRST_MATCH", false),
        };

        let discovery_timeout =
            Duration::from_secs(read_u64_with_default("DISCOVERY_TIMEOUT_SECONDS", 10)?);
        let stale_timeout =
            Duration::from_secs(read_u64_with_default("STALE_DATA_TIMEOUT_SECONDS", 60)?);
        let stale_check_interval =
            Duration::from_secs(read_u64_with_default("STALE_CHECK_INTERVAL_SECONDS", 10)?);
        if stale_check_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "STALE_CHECK_INTERVAL_SECONDS".to_string(),
                "0".to_string(),
            ));
        }

        Ok(Self {
            source,
            tibber,
            homewizard,
            serial,
            lametric,
            discovery_timeout,
            stale_timeout,
            stale_check_interval,
        })
    }
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match read_optional(key) {
        Some(value) => value,
        None => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match read_optional(key) {
        Some(value) => value,
        None => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}

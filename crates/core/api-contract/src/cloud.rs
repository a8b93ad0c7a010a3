use serde::{Deserialize, Serialize};

/// GraphQL HTTP 请求体。
#[derive(Debug, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
}

/// 引导查询响应。
#[derive(Debug, Default, Deserialize)]
pub struct BootstrapResponse {
    #[serde(default)]
    pub data: Option<BootstrapData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BootstrapData {
    #[serde(default)]
    pub viewer: Option<Viewer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    #[serde(default)]
    pub websocket_subscription_url: Option<String>,
    #[serde(default)]
    pub homes: Vec<Home>,
}

/// 账户下的一个家庭（订阅目标）。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Home {
    pub id: String,
    #[serde(default)]
    pub app_nickname: Option<String>,
    #[serde(default)]
    pub features: Option<HomeFeatures>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeFeatures {
    #[serde(default)]
    pub real_time_consumption_enabled: Option<bool>,
}

impl Home {
    /// 是否开启了实时数据（已接入实时电表）。
    pub fn real_time_enabled(&self) -> bool {
        self.features
            .as_ref()
            .and_then(|features| features.real_time_consumption_enabled)
            .unwrap_or(false)
    }
}

impl BootstrapResponse {
    pub fn subscription_url(&self) -> Option<&str> {
        self.viewer()
            .and_then(|viewer| viewer.websocket_subscription_url.as_deref())
            .filter(|url| !url.is_empty())
    }

    /// 第一个开启实时数据的家庭。
    pub fn first_real_time_home(&self) -> Option<&Home> {
        self.viewer()?
            .homes
            .iter()
            .find(|home| home.real_time_enabled())
    }

    fn viewer(&self) -> Option<&Viewer> {
        self.data.as_ref()?.viewer.as_ref()
    }
}

/// 客户端 → 服务端（graphql-transport-ws）。
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloudClientMessage {
    ConnectionInit { payload: InitPayload },
    Subscribe { id: String, payload: SubscribePayload },
    Pong,
}

#[derive(Debug, Serialize)]
pub struct InitPayload {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SubscribePayload {
    pub query: String,
}

/// 服务端 → 客户端（graphql-transport-ws）。
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloudServerMessage {
    ConnectionAck,
    ConnectionError {
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    Next {
        #[serde(default)]
        payload: NextPayload,
    },
    Error {
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    Complete,
    Ping,
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
pub struct NextPayload {
    #[serde(default)]
    pub data: Option<NextData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextData {
    #[serde(default)]
    pub live_measurement: Option<LiveMeasurement>,
}

/// 实时测量值（订阅字段 `timestamp`、`power`）。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiveMeasurement {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub power: Option<f64>,
}

impl NextPayload {
    pub fn live_measurement(&self) -> Option<&LiveMeasurement> {
        self.data.as_ref()?.live_measurement.as_ref()
    }
}

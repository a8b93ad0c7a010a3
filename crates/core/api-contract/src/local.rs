use serde::{Deserialize, Serialize};

/// v1 `/api/v1/data` 响应，仅关心有功功率。
#[derive(Debug, Default, Deserialize)]
pub struct P1DataResponse {
    #[serde(default)]
    pub active_power_w: Option<f64>,
}

/// 设备 → 客户端（v2 WebSocket）。未知类型落入 `Other` 并被忽略。
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceMessage {
    AuthorizationRequested {
        #[serde(default)]
        data: AuthorizationRequest,
    },
    Authorized,
    Error {
        #[serde(default)]
        data: DeviceError,
    },
    Measurement {
        #[serde(default)]
        data: Measurement,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizationRequest {
    #[serde(default)]
    pub api_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeviceError {
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Measurement {
    #[serde(default, alias = "active_power_w")]
    pub power_w: Option<f64>,
    /// 设备时间戳，可能是字符串也可能是数字。
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

impl Measurement {
    pub fn timestamp_text(&self) -> Option<String> {
        match self.timestamp.as_ref()? {
            serde_json::Value::String(text) => Some(text.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// 客户端 → 设备（v2 WebSocket）。
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DeviceClientMessage {
    Authorization(String),
    Subscribe(String),
}

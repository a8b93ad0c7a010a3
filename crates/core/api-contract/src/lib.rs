//! 稳定的外部报文契约。
//!
//! - `cloud`：云端 GraphQL 引导查询与 graphql-transport-ws 订阅报文
//! - `local`：本地电表 v1 HTTP 数据与 v2 WebSocket 报文
//! - `display`：显示屏推送帧

pub mod cloud;
pub mod display;
pub mod local;

pub use cloud::{
    BootstrapResponse, CloudClientMessage, CloudServerMessage, GraphQlRequest, Home,
    LiveMeasurement,
};
pub use display::{Frame, FramePayload};
pub use local::{DeviceClientMessage, DeviceMessage, P1DataResponse};

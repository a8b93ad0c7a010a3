//! 两种 WebSocket 数据源共用的收发工具。

use crate::IngestError;
use async_tungstenite::WebSocketStream;
use async_tungstenite::tokio::{ConnectStream, connect_async_with_tls_connector};
use async_tungstenite::tungstenite::Message;
use async_tungstenite::tungstenite::client::IntoClientRequest;
use async_tungstenite::tungstenite::handshake::client::Request;
use async_tungstenite::tungstenite::http::HeaderValue;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::time::Duration;

pub(crate) type WsStream = WebSocketStream<ConnectStream>;

/// 构造带附加头的握手请求。
pub(crate) fn build_request(
    url: &str,
    headers: &[(&'static str, &str)],
) -> Result<Request, IngestError> {
    let mut request = url
        .into_client_request()
        .map_err(|err| IngestError::Configuration(format!("invalid websocket url {url}: {err}")))?;
    for (name, value) in headers {
        let value = HeaderValue::from_str(value)
            .map_err(|err| IngestError::Configuration(format!("invalid header {name}: {err}")))?;
        request.headers_mut().insert(*name, value);
    }
    Ok(request)
}

/// 自签名设备证书：关闭证书与主机名校验，仅用于本地电表。
pub(crate) fn insecure_tls_connector() -> Result<tokio_native_tls::TlsConnector, IngestError> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|err| IngestError::Configuration(format!("tls connector: {err}")))?;
    Ok(tokio_native_tls::TlsConnector::from(connector))
}

pub(crate) async fn open(
    request: Request,
    tls: Option<tokio_native_tls::TlsConnector>,
) -> Result<WsStream, IngestError> {
    let (stream, _response) = connect_async_with_tls_connector(request, tls)
        .await
        .map_err(|err| IngestError::Connectivity(format!("websocket connect: {err}")))?;
    Ok(stream)
}

pub(crate) async fn send_json<T: Serialize>(
    socket: &mut WsStream,
    message: &T,
) -> Result<(), IngestError> {
    let text = serde_json::to_string(message)
        .map_err(|err| IngestError::Protocol(format!("encode message: {err}")))?;
    socket
        .send(Message::text(text))
        .await
        .map_err(|err| IngestError::Connectivity(format!("websocket send: {err}")))
}

/// 下一条文本帧；连接关闭视为连接错误。
pub(crate) async fn next_text(socket: &mut WsStream) -> Result<String, IngestError> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_string()),
            Some(Ok(Message::Close(frame))) => {
                return Err(IngestError::Connectivity(format!(
                    "connection closed by peer: {frame:?}"
                )));
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                return Err(IngestError::Connectivity(format!("websocket read: {err}")));
            }
            None => return Err(IngestError::Connectivity("connection closed".to_string())),
        }
    }
}

/// 握手阶段的带超时读取。
pub(crate) async fn next_text_within(
    socket: &mut WsStream,
    timeout: Duration,
) -> Result<String, IngestError> {
    tokio::time::timeout(timeout, next_text(socket))
        .await
        .map_err(|_| IngestError::Connectivity(format!("no message within {timeout:?}")))?
}

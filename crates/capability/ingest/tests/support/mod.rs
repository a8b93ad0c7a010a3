//! WebSocket 测试服务端。

#![allow(dead_code)]

use async_tungstenite::WebSocketStream;
use async_tungstenite::tokio::{TokioAdapter, accept_hdr_async};
use async_tungstenite::tungstenite::Message;
use async_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

pub type ServerWs = WebSocketStream<TokioAdapter<TcpStream>>;

/// 回显客户端请求的子协议。
fn echo_subprotocol(request: &Request, mut response: Response) -> Result<Response, ErrorResponse> {
    if let Some(protocol) = request.headers().get("Sec-WebSocket-Protocol") {
        response
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", protocol.clone());
    }
    Ok(response)
}

/// 依次接受 `connections` 个连接，每个连接交给 `session(index, ws)` 处理。
pub async fn spawn_ws<F, Fut>(connections: usize, session: F) -> SocketAddr
where
    F: Fn(usize, ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        for index in 0..connections {
            let (stream, _) = listener.accept().await.expect("accept");
            let ws = accept_hdr_async(stream, echo_subprotocol)
                .await
                .expect("handshake");
            session(index, ws).await;
        }
    });
    addr
}

pub async fn send(ws: &mut ServerWs, value: Value) {
    ws.send(Message::text(value.to_string()))
        .await
        .expect("server send");
}

pub async fn recv(ws: &mut ServerWs) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(text.as_str()).expect("client json");
            }
            Some(Ok(_)) => continue,
            other => panic!("client went away: {other:?}"),
        }
    }
}

/// 保持连接直到客户端断开。
pub async fn hold(ws: &mut ServerWs) {
    while let Some(Ok(_)) = ws.next().await {}
}

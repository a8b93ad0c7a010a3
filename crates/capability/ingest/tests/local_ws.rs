mod support;

use async_trait::async_trait;
use bridge_discovery::{DiscoveryError, MeterLocator};
use bridge_ingest::{IngestError, LocalWsConfig, LocalWsSource, Source};
use domain::ConnectionState;
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use support::{ServerWs, hold, recv, send, spawn_ws};
use tokio_util::sync::CancellationToken;

const TOKEN: &str = "E9B8F7CA1A56D2ABC9A2E4F1F8B6F7A1";

/// 固定返回给定地址并记录调用次数的定位器。
struct CountingLocator {
    ip: Option<IpAddr>,
    calls: AtomicUsize,
}

impl CountingLocator {
    fn new(ip: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            ip: ip.map(|ip| ip.parse().expect("ip")),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MeterLocator for CountingLocator {
    async fn locate_meter(&self) -> Result<IpAddr, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ip.ok_or(DiscoveryError::NotFound("meter"))
    }
}

fn config(host: String) -> LocalWsConfig {
    LocalWsConfig {
        host: Some(host),
        token: Some(TOKEN.to_string()),
        tls: false,
        handshake_timeout: Duration::from_secs(2),
        reconnect_delay: Duration::from_millis(10),
        rediscover_after: 3,
    }
}

/// 设备端标准授权流程。
async fn authorize(ws: &mut ServerWs) {
    send(ws, json!({ "type": "authorization_requested", "data": { "api_version": "2.0.0" } })).await;
    let authorization = recv(ws).await;
    assert_eq!(authorization, json!({ "type": "authorization", "data": TOKEN }));
    send(ws, json!({ "type": "authorized" })).await;
    let subscribe = recv(ws).await;
    assert_eq!(subscribe, json!({ "type": "subscribe", "data": "measurement" }));
}

async fn measurement_server() -> SocketAddr {
    spawn_ws(1, |_, mut ws| async move {
        authorize(&mut ws).await;
        send(&mut ws, json!({ "type": "measurement", "data": {
            "power_w": 512.0, "timestamp": "2025-06-01T12:00:00" } }))
        .await;
        send(&mut ws, json!({ "type": "system", "data": { "wifi_rssi_db": -70 } })).await;
        send(&mut ws, json!({ "type": "measurement", "data": { "energy_import_kwh": 1200.5 } })).await;
        send(&mut ws, json!({ "type": "measurement", "data": { "active_power_w": -80.0 } })).await;
        hold(&mut ws).await;
    })
    .await
}

#[tokio::test]
async fn authorizes_subscribes_and_streams_measurements() {
    let addr = measurement_server().await;
    let mut source = LocalWsSource::new(config(addr.to_string()), CountingLocator::new(None));
    source.connect().await.expect("connect");
    let cancel = CancellationToken::new();

    let first = source.next_reading(&cancel).await.expect("ok").expect("reading");
    assert_eq!(first.power_watts(), 512.0);
    assert_eq!(first.timestamp(), Some("2025-06-01T12:00:00"));
    assert_eq!(source.state(), ConnectionState::Streaming);

    let second = source.next_reading(&cancel).await.expect("ok").expect("reading");
    assert_eq!(second.power_watts(), -80.0);
    assert_eq!(second.timestamp(), None);
}

#[tokio::test]
async fn authorization_error_is_fatal() {
    let addr = spawn_ws(1, |_, mut ws| async move {
        send(&mut ws, json!({ "type": "authorization_requested", "data": { "api_version": "2.0.0" } })).await;
        let _authorization = recv(&mut ws).await;
        send(&mut ws, json!({ "type": "error", "data": { "error": "user:unauthorized" } })).await;
        hold(&mut ws).await;
    })
    .await;
    let mut source = LocalWsSource::new(config(addr.to_string()), CountingLocator::new(None));
    source.connect().await.expect("connect");

    let err = source
        .next_reading(&CancellationToken::new())
        .await
        .expect_err("rejected");
    assert!(matches!(err, IngestError::Rejected(ref reason) if reason == "user:unauthorized"));
    assert_eq!(source.state(), ConnectionState::Exhausted);
}

#[tokio::test]
async fn unexpected_handshake_message_reconnects() {
    let addr = spawn_ws(2, |index, mut ws| async move {
        if index == 0 {
            send(&mut ws, json!({ "type": "measurement", "data": { "power_w": 1.0 } })).await;
        } else {
            authorize(&mut ws).await;
            send(&mut ws, json!({ "type": "measurement", "data": { "power_w": 640.0 } })).await;
        }
        hold(&mut ws).await;
    })
    .await;
    let mut source = LocalWsSource::new(config(addr.to_string()), CountingLocator::new(None));
    source.connect().await.expect("connect");

    let reading = source
        .next_reading(&CancellationToken::new())
        .await
        .expect("ok")
        .expect("reading");
    assert_eq!(reading.power_watts(), 640.0);
}

#[tokio::test]
async fn rediscovers_after_three_consecutive_failures() {
    let addr = measurement_server().await;
    // 127.0.0.2 上无监听，连接被拒绝
    let stale_host = format!("127.0.0.2:{}", addr.port());
    let locator = CountingLocator::new(Some("127.0.0.1"));
    let mut source = LocalWsSource::new(config(stale_host), locator.clone());
    source.connect().await.expect("connect");

    let reading = source
        .next_reading(&CancellationToken::new())
        .await
        .expect("ok")
        .expect("reading");
    assert_eq!(reading.power_watts(), 512.0);
    assert_eq!(locator.calls(), 1);

    let endpoint = source.endpoint().expect("endpoint");
    assert_eq!(endpoint.host(), "127.0.0.1");
    assert_eq!(endpoint.port(), Some(addr.port()));
    assert!(endpoint.is_discovered());
}

#[tokio::test]
async fn rediscovers_after_repeated_disconnects_mid_stream() {
    // 前三次授权成功后立即断开，第四次才推送数据
    let addr = spawn_ws(4, |index, mut ws| async move {
        authorize(&mut ws).await;
        if index < 3 {
            return;
        }
        send(&mut ws, json!({ "type": "measurement", "data": { "power_w": 777.0 } })).await;
        hold(&mut ws).await;
    })
    .await;
    let locator = CountingLocator::new(Some("127.0.0.1"));
    let mut source = LocalWsSource::new(config(addr.to_string()), locator.clone());
    source.connect().await.expect("connect");

    let reading = source
        .next_reading(&CancellationToken::new())
        .await
        .expect("ok")
        .expect("reading");
    assert_eq!(reading.power_watts(), 777.0);
    assert_eq!(locator.calls(), 1);
    assert_eq!(source.state(), ConnectionState::Streaming);
}

#[tokio::test]
async fn connect_discovers_meter_when_no_host() {
    let locator = CountingLocator::new(Some("192.168.1.40"));
    let mut config = config(String::new());
    config.host = None;
    let mut source = LocalWsSource::new(config, locator.clone());

    source.connect().await.expect("connect");
    let endpoint = source.endpoint().expect("endpoint");
    assert_eq!(endpoint.host(), "192.168.1.40");
    assert!(endpoint.is_discovered());
    assert_eq!(locator.calls(), 1);
}

#[tokio::test]
async fn missing_token_is_configuration_error() {
    let mut config = config("192.168.1.40".to_string());
    config.token = None;
    let mut source = LocalWsSource::new(config, CountingLocator::new(None));
    let err = source.connect().await.expect_err("no token");
    assert!(matches!(err, IngestError::Configuration(_)));
}

#[tokio::test]
async fn failed_discovery_at_connect_is_fatal() {
    let mut config = config(String::new());
    config.host = None;
    let mut source = LocalWsSource::new(config, CountingLocator::new(None));
    let err = source.connect().await.expect_err("no meter");
    assert!(matches!(err, IngestError::Discovery(_)));
}

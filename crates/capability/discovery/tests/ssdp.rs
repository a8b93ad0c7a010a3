use bridge_discovery::ssdp::DISPLAY_SEARCH_TARGET;
use bridge_discovery::{DiscoveryError, DisplayLocator, SsdpDisplayLocator, SsdpPolicy};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;

const MATCHING_REPLY: &str = "HTTP/1.1 200 OK\r\n\
CACHE-CONTROL: max-age=1800\r\n\
LOCATION: http://127.0.0.1:4343/description.xml\r\n\
ST: urn:schemas-upnp-org:device:LaMetric:1\r\n\
USN: uuid:display-1::urn:schemas-upnp-org:device:LaMetric:1\r\n\r\n";

/// 本地应答器：收到 M-SEARCH 后按给定报文从另一个临时端口回复。
async fn spawn_responder(replies: Vec<&'static str>) -> SocketAddr {
    spawn_responder_from(vec!["127.0.0.1"], replies).await
}

/// 同上，但依次从每个回环地址各回复一遍，模拟网内多台设备。
async fn spawn_responder_from(hosts: Vec<&'static str>, replies: Vec<&'static str>) -> SocketAddr {
    let listener = UdpSocket::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("listener addr");
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        let (len, from) = listener.recv_from(&mut buf).await.expect("recv search");
        let request = String::from_utf8_lossy(&buf[..len]).to_string();
        assert!(request.contains(DISPLAY_SEARCH_TARGET));
        for host in hosts {
            let replier = UdpSocket::bind((host, 0)).await.expect("bind replier");
            for reply in &replies {
                replier.send_to(reply.as_bytes(), from).await.expect("reply");
            }
        }
    });
    addr
}

#[tokio::test]
async fn first_match_returns_responder_from_ephemeral_port() {
    let responder = spawn_responder(vec![MATCHING_REPLY]).await;
    let locator = SsdpDisplayLocator::new(Duration::from_secs(2), SsdpPolicy::FirstMatch)
        .with_destination(responder);

    let ip = locator.locate_display().await.expect("display");
    assert_eq!(ip, "127.0.0.1".parse::<IpAddr>().expect("ip"));
}

#[tokio::test]
async fn duplicate_replies_from_one_device_are_not_ambiguous() {
    let responder = spawn_responder(vec![MATCHING_REPLY, MATCHING_REPLY]).await;
    let locator = SsdpDisplayLocator::new(Duration::from_millis(500), SsdpPolicy::DetectAmbiguity)
        .with_destination(responder);

    let ip = locator.locate_display().await.expect("display");
    assert_eq!(ip, "127.0.0.1".parse::<IpAddr>().expect("ip"));
}

#[tokio::test]
async fn non_matching_replies_lead_to_not_found() {
    let other = "HTTP/1.1 200 OK\r\nST: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\r\n";
    let responder = spawn_responder(vec![other]).await;
    let locator = SsdpDisplayLocator::new(Duration::from_millis(300), SsdpPolicy::DetectAmbiguity)
        .with_destination(responder);

    let err = locator.locate_display().await.expect_err("no display");
    assert!(matches!(err, DiscoveryError::NotFound(_)));
}

#[tokio::test]
async fn replies_from_two_devices_are_ambiguous() {
    let responder = spawn_responder_from(vec!["127.0.0.1", "127.0.0.2"], vec![MATCHING_REPLY]).await;
    let locator = SsdpDisplayLocator::new(Duration::from_millis(500), SsdpPolicy::DetectAmbiguity)
        .with_destination(responder);

    let err = locator.locate_display().await.expect_err("two displays");
    let DiscoveryError::Ambiguous(found) = err else {
        panic!("expected ambiguity, got {err:?}");
    };
    assert_eq!(found.len(), 2);
    for host in ["127.0.0.1", "127.0.0.2"] {
        assert!(found.contains(&host.parse::<IpAddr>().expect("ip")));
    }
}

#[tokio::test]
async fn first_match_ignores_later_devices() {
    let responder = spawn_responder_from(vec!["127.0.0.1", "127.0.0.2"], vec![MATCHING_REPLY]).await;
    let locator = SsdpDisplayLocator::new(Duration::from_secs(2), SsdpPolicy::FirstMatch)
        .with_destination(responder);

    let ip = locator.locate_display().await.expect("display");
    assert_eq!(ip, "127.0.0.1".parse::<IpAddr>().expect("ip"));
}

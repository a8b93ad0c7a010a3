use api_contract::{
    BootstrapResponse, CloudClientMessage, CloudServerMessage, DeviceClientMessage, DeviceMessage,
    FramePayload, P1DataResponse,
};
use api_contract::cloud::{InitPayload, SubscribePayload};
use serde_json::{Value, json};

#[test]
fn bootstrap_picks_first_real_time_home() {
    let payload = json!({
        "data": {
            "viewer": {
                "websocketSubscriptionUrl": "wss://websocket-api.tibber.com/v1-beta/gql/subscriptions",
                "homes": [
                    { "id": "home-1", "appNickname": "Cabin", "features": { "realTimeConsumptionEnabled": false } },
                    { "id": "home-2", "appNickname": null, "features": { "realTimeConsumptionEnabled": true } },
                    { "id": "home-3", "features": { "realTimeConsumptionEnabled": true } }
                ]
            }
        }
    });
    let response: BootstrapResponse = serde_json::from_value(payload).expect("parse");
    assert_eq!(
        response.subscription_url(),
        Some("wss://websocket-api.tibber.com/v1-beta/gql/subscriptions")
    );
    assert_eq!(response.first_real_time_home().map(|h| h.id.as_str()), Some("home-2"));
}

#[test]
fn bootstrap_tolerates_missing_viewer() {
    let response: BootstrapResponse =
        serde_json::from_str(r#"{"errors":[{"message":"unauthorized"}]}"#).expect("parse");
    assert!(response.subscription_url().is_none());
    assert!(response.first_real_time_home().is_none());
}

#[test]
fn cloud_client_messages_are_tagged() {
    let init = CloudClientMessage::ConnectionInit {
        payload: InitPayload {
            token: "token-1".to_string(),
        },
    };
    let value = serde_json::to_value(init).expect("serialize");
    assert_eq!(value, json!({ "type": "connection_init", "payload": { "token": "token-1" } }));

    let subscribe = CloudClientMessage::Subscribe {
        id: "1".to_string(),
        payload: SubscribePayload {
            query: "subscription { x }".to_string(),
        },
    };
    let value = serde_json::to_value(subscribe).expect("serialize");
    assert_eq!(value["type"], "subscribe");
    assert_eq!(value["id"], "1");
    assert_eq!(value["payload"]["query"], "subscription { x }");

    let pong = serde_json::to_value(CloudClientMessage::Pong).expect("serialize");
    assert_eq!(pong, json!({ "type": "pong" }));
}

#[test]
fn cloud_next_carries_live_measurement() {
    let text = r#"{"id":"1","type":"next","payload":{"data":{"liveMeasurement":{"timestamp":"2024-05-01T10:00:00+02:00","power":1234.5}}}}"#;
    let message: CloudServerMessage = serde_json::from_str(text).expect("parse");
    let CloudServerMessage::Next { payload } = message else {
        panic!("expected next");
    };
    let measurement = payload.live_measurement().expect("measurement");
    assert_eq!(measurement.power, Some(1234.5));
    assert_eq!(measurement.timestamp.as_deref(), Some("2024-05-01T10:00:00+02:00"));
}

#[test]
fn cloud_unknown_type_is_other() {
    let message: CloudServerMessage = serde_json::from_str(r#"{"type":"ka"}"#).expect("parse");
    assert!(matches!(message, CloudServerMessage::Other));
    let message: CloudServerMessage =
        serde_json::from_str(r#"{"type":"connection_ack","payload":{}}"#).expect("parse");
    assert!(matches!(message, CloudServerMessage::ConnectionAck));
}

#[test]
fn p1_data_field_is_optional() {
    let data: P1DataResponse =
        serde_json::from_str(r#"{"wifi_ssid":"net","active_power_w":-500}"#).expect("parse");
    assert_eq!(data.active_power_w, Some(-500.0));
    let data: P1DataResponse = serde_json::from_str(r#"{"wifi_ssid":"net"}"#).expect("parse");
    assert!(data.active_power_w.is_none());
}

#[test]
fn device_messages_parse() {
    let message: DeviceMessage = serde_json::from_str(
        r#"{"type":"authorization_requested","data":{"api_version":"2.0.0"}}"#,
    )
    .expect("parse");
    match message {
        DeviceMessage::AuthorizationRequested { data } => {
            assert_eq!(data.api_version.as_deref(), Some("2.0.0"))
        }
        other => panic!("unexpected {:?}", other),
    }

    let message: DeviceMessage =
        serde_json::from_str(r#"{"type":"measurement","data":{"power_w":999,"timestamp":"2024-05-01T10:00:00"}}"#)
            .expect("parse");
    match message {
        DeviceMessage::Measurement { data } => {
            assert_eq!(data.power_w, Some(999.0));
            assert_eq!(data.timestamp_text().as_deref(), Some("2024-05-01T10:00:00"));
        }
        other => panic!("unexpected {:?}", other),
    }

    let message: DeviceMessage =
        serde_json::from_str(r#"{"type":"system","data":{"cloud_enabled":false}}"#).expect("parse");
    assert!(matches!(message, DeviceMessage::Other));
}

#[test]
fn device_measurement_accepts_v1_field_name() {
    let message: DeviceMessage =
        serde_json::from_str(r#"{"type":"measurement","data":{"active_power_w":1500}}"#)
            .expect("parse");
    let DeviceMessage::Measurement { data } = message else {
        panic!("expected measurement");
    };
    assert_eq!(data.power_w, Some(1500.0));
    assert!(data.timestamp_text().is_none());
}

#[test]
fn device_client_messages_are_adjacently_tagged() {
    let auth = serde_json::to_value(DeviceClientMessage::Authorization("token-123".to_string()))
        .expect("serialize");
    assert_eq!(auth, json!({ "type": "authorization", "data": "token-123" }));
    let subscribe = serde_json::to_value(DeviceClientMessage::Subscribe("measurement".to_string()))
        .expect("serialize");
    assert_eq!(subscribe, json!({ "type": "subscribe", "data": "measurement" }));
}

#[test]
fn frame_payload_shape() {
    let value: Value = serde_json::to_value(FramePayload::single("1500 W", 26337)).expect("serialize");
    assert_eq!(
        value,
        json!({ "frames": [ { "text": "1500 W", "icon": 26337, "index": 0 } ] })
    );
}

//! End-to-end tests: client frames in, serial bytes out
//!
//! Each test drives a [`ConnectionServer`] through in-memory client sockets
//! backed by a real [`DeviceController`] on the mock serial transport.
//!
//! Run with: cargo test -p clib-api --test protocol_e2e_test

use std::sync::Arc;
use std::time::Duration;

use clib_api::testing::{channel_socket, ClientEnd};
use clib_api::{AckMode, ConnectionServer, DeviceDescriptor, ProtocolOptions};
use clib_serial::config::{ControllerConfig, MockConfig};
use clib_serial::transport::mock::MockSerialTransport;
use clib_serial::DeviceController;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

struct TestFixture {
    mock: Arc<MockSerialTransport>,
    server: Arc<ConnectionServer>,
}

impl TestFixture {
    async fn new(ack_mode: AckMode) -> Self {
        let mock = Arc::new(MockSerialTransport::new(&MockConfig::default()));
        let controller = Arc::new(DeviceController::new(mock.clone(), ControllerConfig::default()));
        controller.open().await.unwrap();

        let options = ProtocolOptions {
            ack_mode,
            ..Default::default()
        };
        let server = Arc::new(ConnectionServer::new(controller, options));
        Self { mock, server }
    }

    /// Connect a client; the server side runs on its own task
    fn connect(&self) -> (ClientEnd, JoinHandle<()>) {
        let (socket, client) = channel_socket();
        let server = self.server.clone();
        let handle = tokio::spawn(async move { server.accept(socket).await });
        (client, handle)
    }

    /// Bytes written after the open handshake's safety zero
    fn power_writes(&self) -> Vec<u8> {
        self.mock.written().into_iter().skip(1).collect()
    }
}

async fn exchange(client: &mut ClientEnd, frame: Value) -> Value {
    client.send(frame.to_string());
    client.recv_json().await
}

async fn wait_for_idle(server: &ConnectionServer) {
    for _ in 0..100 {
        if !server.is_busy() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("connection slot never released");
}

// =============================================================================
// Handshake
// =============================================================================

#[tokio::test]
async fn test_server_info_exact_reply() {
    let fixture = TestFixture::new(AckMode::Immediate).await;
    let (mut client, _) = fixture.connect();

    client.send(r#"[{"RequestServerInfo":{"Id":1,"ClientName":"x","MessageVersion":3}}]"#);
    let raw = client.recv().await.unwrap();

    assert_eq!(
        raw,
        r#"[{"ServerInfo":{"Id":1,"ServerName":"Clib-Server","MessageVersion":3,"MaxPingTime":0}}]"#
    );
}

#[tokio::test]
async fn test_version_selects_descriptor() {
    let fixture = TestFixture::new(AckMode::Immediate).await;
    let (mut client, _) = fixture.connect();

    let reply = exchange(
        &mut client,
        json!([
            {"RequestServerInfo": {"Id": 1, "ClientName": "x", "MessageVersion": 3}},
            {"RequestDeviceList": {"Id": 2}}
        ]),
    )
    .await;
    assert_eq!(
        reply[1]["DeviceList"]["Devices"],
        json!([DeviceDescriptor::scalar()])
    );

    let reply = exchange(
        &mut client,
        json!([
            {"RequestServerInfo": {"Id": 3, "ClientName": "x", "MessageVersion": 1}},
            {"RequestDeviceList": {"Id": 4}}
        ]),
    )
    .await;
    assert_eq!(
        reply[1],
        json!({"DeviceList": {"Id": 4, "Devices": [{
            "DeviceName": "Clib",
            "DeviceIndex": 0,
            "DeviceMessages": {
                "StopDeviceCmd": {},
                "VibrateCmd": {"FeatureCount": 1, "StepCount": [126]}
            }
        }]}})
    );
}

// =============================================================================
// Device commands
// =============================================================================

#[tokio::test]
async fn test_scalar_cmd_writes_rounded_power() {
    let fixture = TestFixture::new(AckMode::AfterWrite).await;
    let (mut client, _) = fixture.connect();

    let reply = exchange(
        &mut client,
        json!([{"ScalarCmd": {"Id": 2, "DeviceIndex": 0, "Scalars": [
            {"Index": 0, "Scalar": 0.5, "ActuatorType": "Vibrate"}
        ]}}]),
    )
    .await;

    assert_eq!(reply, json!([{"Ok": {"Id": 2}}]));
    assert_eq!(fixture.power_writes(), vec![64]);
}

#[tokio::test]
async fn test_immediate_ack_still_reaches_device() {
    let fixture = TestFixture::new(AckMode::Immediate).await;
    let (mut client, _) = fixture.connect();

    let reply = exchange(
        &mut client,
        json!([{"VibrateCmd": {"Id": 9, "DeviceIndex": 0, "Speeds": [{"Index": 0, "Speed": 1.0}]}}]),
    )
    .await;
    assert_eq!(reply, json!([{"Ok": {"Id": 9}}]));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fixture.power_writes(), vec![127]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_immediate_ack_stop_lands_last() {
    for _ in 0..20 {
        let fixture = TestFixture::new(AckMode::Immediate).await;
        let (mut client, _) = fixture.connect();

        let reply = exchange(
            &mut client,
            json!([
                {"ScalarCmd": {"Id": 1, "DeviceIndex": 0, "Scalars": [{"Index": 0, "Scalar": 1.0}]}},
                {"StopDeviceCmd": {"Id": 2, "DeviceIndex": 0}}
            ]),
        )
        .await;
        assert_eq!(reply, json!([{"Ok": {"Id": 1}}, {"Ok": {"Id": 2}}]));

        tokio::time::timeout(Duration::from_secs(1), async {
            while fixture.power_writes().len() < 2 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(fixture.power_writes(), vec![127, 0]);
    }
}

#[tokio::test]
async fn test_after_write_failure_is_device_error() {
    let fixture = TestFixture::new(AckMode::AfterWrite).await;
    let (mut client, _) = fixture.connect();
    fixture.mock.set_fail_writes(true);

    let reply = exchange(&mut client, json!([{"StopAllDevices": {"Id": 11}}])).await;

    assert_eq!(reply[0]["Error"]["Id"], 11);
    assert_eq!(reply[0]["Error"]["ErrorCode"], 4);
}

// =============================================================================
// Batches
// =============================================================================

#[tokio::test]
async fn test_unknown_command_error() {
    let fixture = TestFixture::new(AckMode::Immediate).await;
    let (mut client, _) = fixture.connect();

    let reply = exchange(&mut client, json!([{"Foo": {"Id": 5}}])).await;

    let entries = reply.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    let error = entries[0]["Error"].as_object().unwrap();
    assert_eq!(error["Id"], 5);
    assert_eq!(error["ErrorCode"], 1);
    assert!(error["ErrorMessage"].is_string());
    assert_eq!(error.len(), 3);
}

#[tokio::test]
async fn test_batch_replies_in_order() {
    let fixture = TestFixture::new(AckMode::AfterWrite).await;
    let (mut client, _) = fixture.connect();

    let reply = exchange(
        &mut client,
        json!([
            {"StartScanning": {"Id": 10}},
            {"Foo": {"Id": 11}},
            {"Ping": {"Id": 12}},
            {"StopDeviceCmd": {"Id": 13, "DeviceIndex": 0}},
            {"StopScanning": {"Id": 14}}
        ]),
    )
    .await;

    let ids: Vec<u64> = reply
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| {
            let body = entry.as_object().unwrap().values().next().unwrap();
            body["Id"].as_u64().unwrap()
        })
        .collect();
    assert_eq!(ids, vec![10, 11, 12, 13, 14]);
    assert!(reply[1].get("Error").is_some());
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() {
    let fixture = TestFixture::new(AckMode::Immediate).await;
    let (mut client, _) = fixture.connect();

    client.send("{not json");
    let reply = client.recv_json().await;
    assert_eq!(reply[0]["Error"]["Id"], 0);
    assert_eq!(reply[0]["Error"]["ErrorCode"], 1);

    client.send(r#"{"Ping":{"Id":1}}"#);
    let reply = client.recv_json().await;
    assert_eq!(reply[0]["Error"]["Id"], 0);

    let reply = exchange(&mut client, json!([{"Ping": {"Id": 2}}])).await;
    assert_eq!(reply, json!([{"Ok": {"Id": 2}}]));
}

#[tokio::test]
async fn test_empty_frame_gets_no_reply() {
    let fixture = TestFixture::new(AckMode::Immediate).await;
    let (mut client, _) = fixture.connect();

    client.send("");
    let reply = exchange(&mut client, json!([{"Ping": {"Id": 3}}])).await;

    // The first frame back answers the ping, not the empty frame
    assert_eq!(reply, json!([{"Ok": {"Id": 3}}]));
}

// =============================================================================
// Single-client policy
// =============================================================================

#[tokio::test]
async fn test_second_client_is_terminated() {
    let fixture = TestFixture::new(AckMode::Immediate).await;
    let (mut first, _) = fixture.connect();

    exchange(
        &mut first,
        json!([{"RequestServerInfo": {"Id": 1, "ClientName": "a", "MessageVersion": 1}}]),
    )
    .await;

    let (mut second, handle) = fixture.connect();
    handle.await.unwrap();
    assert!(second.is_terminated());
    assert!(second.closed().await);

    // First session keeps its negotiated version
    let reply = exchange(&mut first, json!([{"RequestDeviceList": {"Id": 2}}])).await;
    assert_eq!(
        reply[0]["DeviceList"]["Devices"],
        json!([DeviceDescriptor::legacy()])
    );
}

#[tokio::test]
async fn test_sequential_clients_get_fresh_sessions() {
    let fixture = TestFixture::new(AckMode::Immediate).await;

    let (mut first, handle) = fixture.connect();
    exchange(
        &mut first,
        json!([{"RequestServerInfo": {"Id": 1, "ClientName": "a", "MessageVersion": 1}}]),
    )
    .await;
    first.disconnect();
    handle.await.unwrap();
    wait_for_idle(&fixture.server).await;

    let (mut second, _) = fixture.connect();
    let reply = exchange(&mut second, json!([{"RequestDeviceList": {"Id": 1}}])).await;
    assert_eq!(
        reply[0]["DeviceList"]["Devices"],
        json!([DeviceDescriptor::scalar()])
    );
    assert!(!second.is_terminated());
}

//! Zenoh seams end to end on a single local session.
//!
//! Zenoh requires a multi-thread tokio runtime. Each test uses a unique key
//! prefix to avoid interference.

use std::sync::Arc;
use std::time::Duration;

use input_remapper_service::capture::{CaptureProvider, EventSource};
use input_remapper_service::control::{self, ControlRequest, ControlResponse, ControlTransport};
use input_remapper_service::ServiceError;
use input_remapper_service::mapping::HandlerChain;
use input_remapper_service::registry::{DeviceRegistry, OutputBackend, VirtualOutput};
use input_remapper_service::status::ServiceStatus;
use input_remapper_service::supervisor::WorkerSupervisor;
use input_remapper_service::zenoh_io::{
    ZenohCapture, ZenohControl, ZenohOutputBackend, query_control,
};
use remapper_common::{Format, InputEvent, KeyExprBuilder, decode, decode_auto, encode};

fn unique_prefix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("test_{}", nanos)
}

async fn open_session() -> Arc<zenoh::Session> {
    let mut config = zenoh::Config::default();
    config
        .insert_json5("scouting/multicast/enabled", "false")
        .unwrap();
    Arc::new(zenoh::open(config).await.unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_control_queryable() {
    let session = open_session().await;
    let keys = KeyExprBuilder::new(unique_prefix()).unwrap();

    let status = session.declare_subscriber(keys.status_key()).await.unwrap();

    let (client, mut requests) = control::channel(4);
    let server = tokio::spawn(async move {
        let envelope = requests.recv().await.unwrap();
        assert_eq!(envelope.request, ControlRequest::ListDevices);
        envelope
            .reply
            .send(ControlResponse::Devices { devices: vec![] })
            .unwrap();
    });

    let exposed = ZenohControl::new(session.clone(), keys.clone())
        .expose(client)
        .await
        .unwrap();

    let sample = tokio::time::timeout(Duration::from_secs(5), status.recv_async())
        .await
        .expect("Timeout waiting for status")
        .unwrap();
    let running: ServiceStatus = decode_auto(&sample.payload().to_bytes()).unwrap();
    assert_eq!(running.status, "running");

    let response = query_control(
        &session,
        &keys,
        &ControlRequest::ListDevices,
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    assert_eq!(response, ControlResponse::Devices { devices: vec![] });
    server.await.unwrap();

    exposed.close().await;
    let sample = tokio::time::timeout(Duration::from_secs(5), status.recv_async())
        .await
        .expect("Timeout waiting for status")
        .unwrap();
    let offline: ServiceStatus = decode_auto(&sample.payload().to_bytes()).unwrap();
    assert_eq!(offline.status, "offline");

    drop(status);
    session.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_capture_and_injection() {
    let session = open_session().await;
    let keys = KeyExprBuilder::new(unique_prefix()).unwrap();

    let capture = ZenohCapture::new(session.clone(), keys.clone());
    let mut source = capture.open("USB Keyboard").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let event = InputEvent::key(30, 1);
    session
        .put(
            keys.capture_key("USB Keyboard"),
            encode(&event, Format::Cbor).unwrap(),
        )
        .await
        .unwrap();
    let received = tokio::time::timeout(Duration::from_secs(5), source.next_event())
        .await
        .expect("Timeout waiting for captured event");
    assert_eq!(received, Some(event));

    let injected = session.declare_subscriber(keys.inject_key("out")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let backend = ZenohOutputBackend::new(session.clone(), keys.clone());
    let mut output = backend.create("out").await.unwrap();
    output.emit(&InputEvent::key(48, 0)).await.unwrap();

    let sample = tokio::time::timeout(Duration::from_secs(5), injected.recv_async())
        .await
        .expect("Timeout waiting for injected event")
        .unwrap();
    let decoded: InputEvent = decode_auto(&sample.payload().to_bytes()).unwrap();
    assert_eq!(decoded, InputEvent::key(48, 0));

    drop(source);
    drop(injected);
    session.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cbor_injection() {
    let session = open_session().await;
    let keys = KeyExprBuilder::new(unique_prefix()).unwrap();

    let injected = session.declare_subscriber(keys.inject_key("pad")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let backend = ZenohOutputBackend::new(session.clone(), keys.clone()).with_format(Format::Cbor);
    let mut output = backend.create("pad").await.unwrap();
    output.emit(&InputEvent::key(304, 1)).await.unwrap();

    let sample = tokio::time::timeout(Duration::from_secs(5), injected.recv_async())
        .await
        .expect("Timeout waiting for injected event")
        .unwrap();
    let bytes = sample.payload().to_bytes();
    assert_ne!(bytes.first(), Some(&b'{'));
    let decoded: InputEvent = decode(&bytes, Format::Cbor).unwrap();
    assert_eq!(decoded, InputEvent::key(304, 1));

    drop(injected);
    session.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_one_worker_per_inject_key() {
    let session = open_session().await;
    let keys = KeyExprBuilder::new(unique_prefix()).unwrap();
    assert_eq!(keys.inject_key("kbd out"), keys.inject_key("kbd_out"));

    let registry = DeviceRegistry::new(Arc::new(ZenohOutputBackend::new(
        session.clone(),
        keys.clone(),
    )));
    let capture = Arc::new(ZenohCapture::new(session.clone(), keys.clone()));
    let mut supervisor = WorkerSupervisor::new(registry, capture, None)
        .with_grace(Duration::from_millis(300));

    supervisor
        .start("a", "kbd out", HandlerChain::default())
        .await
        .unwrap();
    let err = supervisor
        .start("b", "kbd_out", HandlerChain::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DeviceConflict { owner, .. } if owner == "a"));
    assert_eq!(supervisor.running(), vec!["a"]);

    let injected = session
        .declare_subscriber(keys.inject_key("kbd_out"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    for device in ["a", "b"] {
        session
            .put(
                keys.capture_key(device),
                encode(&InputEvent::key(30, 1), Format::Json).unwrap(),
            )
            .await
            .unwrap();
    }

    let sample = tokio::time::timeout(Duration::from_secs(5), injected.recv_async())
        .await
        .expect("Timeout waiting for injected event")
        .unwrap();
    let decoded: InputEvent = decode_auto(&sample.payload().to_bytes()).unwrap();
    assert_eq!(decoded, InputEvent::key(30, 1));
    let extra = tokio::time::timeout(Duration::from_millis(300), injected.recv_async()).await;
    assert!(extra.is_err(), "a second worker wrote to the same inject key");

    supervisor.stop_all().await;
    drop(injected);
    session.close().await.unwrap();
}

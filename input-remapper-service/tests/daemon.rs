//! Orchestrator tests against in-memory collaborators.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::oneshot;

use common::{eventually, harness, request};
use input_remapper_service::control::{
    ControlClient, ControlRequest, ControlResponse, ControlTransport, ExposedControl,
    LocalControl,
};
use input_remapper_service::mapping::HandlerSet;
use input_remapper_service::registry::DeviceRegistry;
use input_remapper_service::supervisor::WorkerSupervisor;
use input_remapper_service::{Daemon, GlobalConfig, ServiceError};
use remapper_common::InputEvent;

#[tokio::test]
async fn test_bootstrap_publishes_once() {
    let mut h = harness(&[], None).await;
    assert!(h.daemon.is_published());
    assert_eq!(h.control.exposures(), 1);

    h.daemon.publish_control().await.unwrap();
    assert_eq!(h.control.exposures(), 1);
}

/// Fails the first expose, then delegates.
struct FlakyControl {
    attempts: AtomicUsize,
    inner: LocalControl,
}

#[async_trait]
impl ControlTransport for FlakyControl {
    async fn expose(
        &self,
        client: ControlClient,
    ) -> input_remapper_service::Result<Box<dyn ExposedControl>> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(ServiceError::control("bus not ready"));
        }
        self.inner.expose(client).await
    }
}

#[tokio::test]
async fn test_failed_publish_can_be_retried() {
    let (collaborators, _, capture, _) = common::collaborators();
    let flaky = Arc::new(FlakyControl {
        attempts: AtomicUsize::new(0),
        inner: LocalControl::new(),
    });
    let registry = DeviceRegistry::new(collaborators.output);
    let supervisor = WorkerSupervisor::new(registry, capture, None);
    let mut daemon = Daemon::new(
        GlobalConfig::default(),
        "mappings.json5".into(),
        HandlerSet::default(),
        supervisor,
        flaky.clone(),
    );

    assert!(daemon.publish_control().await.is_err());
    assert!(!daemon.is_published());

    daemon.publish_control().await.unwrap();
    assert!(daemon.is_published());
    assert_eq!(flaky.inner.exposures(), 1);
}

#[tokio::test]
async fn test_bootstrap_fails_on_control_stage() {
    let dir = tempfile::tempdir().unwrap();
    let (mut collaborators, _, _, _) = common::collaborators();
    collaborators.control = Arc::new(FlakyControl {
        attempts: AtomicUsize::new(0),
        inner: LocalControl::new(),
    });

    let err = Daemon::bootstrap(common::config(dir.path(), &[]), collaborators, None)
        .await
        .err()
        .unwrap();
    let chain = format!("{:#}", err);
    assert!(chain.contains("publishing control interface"), "{}", chain);
    assert!(chain.contains("bus not ready"), "{}", chain);
}

#[tokio::test]
async fn test_bootstrap_fails_on_bad_rules() {
    let dir = tempfile::tempdir().unwrap();
    common::write_rules(&dir.path().join("mappings.json5"), "{ devices: ");
    let (collaborators, control, _, _) = common::collaborators();

    let err = Daemon::bootstrap(common::config(dir.path(), &[]), collaborators, None)
        .await
        .err()
        .unwrap();
    assert!(format!("{:#}", err).contains("building handler set"));
    assert_eq!(control.exposures(), 0);
}

#[tokio::test]
async fn test_autoload_failures_are_not_fatal() {
    let mut h = harness(&["keyboard", "joystick"], None).await;
    assert_eq!(h.daemon.autoload().await, 1);
    assert!(h.daemon.supervisor().is_running("keyboard"));
    h.daemon.shutdown().await;
}

#[tokio::test]
async fn test_control_requests_drive_workers() {
    let h = harness(&[], None).await;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(h.daemon.run(async move {
        stop_rx.await.ok();
    }));

    let response = request(
        &h.control,
        ControlRequest::StartDevice {
            device: "keyboard".to_string(),
        },
    )
    .await;
    assert_eq!(response, ControlResponse::ok_with("started keyboard"));

    // A second start conflicts and the first worker keeps running.
    let response = request(
        &h.control,
        ControlRequest::StartDevice {
            device: "keyboard".to_string(),
        },
    )
    .await;
    assert!(response.is_error());

    let tx = h.capture.sender("keyboard").unwrap();
    tx.send(InputEvent::key(58, 1)).await.unwrap();
    assert!(eventually(|| h.backend.emitted("kbd-out") == vec![InputEvent::key(1, 1)]).await);

    match request(&h.control, ControlRequest::ListDevices).await {
        ControlResponse::Devices { devices } => {
            assert_eq!(devices.len(), 1);
            assert_eq!(devices[0].device, "keyboard");
            assert_eq!(devices[0].target, "kbd-out");
        }
        other => panic!("unexpected response: {:?}", other),
    }

    let response = request(
        &h.control,
        ControlRequest::StartDevice {
            device: "joystick".to_string(),
        },
    )
    .await;
    assert_eq!(
        response,
        ControlResponse::error("Unknown device: joystick")
    );

    match request(&h.control, ControlRequest::Status).await {
        ControlResponse::Status {
            running,
            configured,
            bridge,
            ..
        } => {
            assert_eq!(running, vec!["keyboard"]);
            assert_eq!(configured, vec!["keyboard", "mouse"]);
            assert!(!bridge);
        }
        other => panic!("unexpected response: {:?}", other),
    }

    stop_tx.send(()).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(h.control.client().is_none());
}

#[tokio::test]
async fn test_shutdown_request_stops_everything() {
    let h = harness(&["keyboard", "mouse"], None).await;
    let task = tokio::spawn(h.daemon.run(std::future::pending()));

    assert!(eventually(|| h.capture.sender("mouse").is_some()).await);
    let response = request(&h.control, ControlRequest::Shutdown).await;
    assert_eq!(response, ControlResponse::ok_with("shutting down"));

    tokio::time::timeout(std::time::Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(h.control.client().is_none());
    // Workers are gone, so their capture channels are closed.
    assert!(h.capture.sender("keyboard").unwrap().is_closed());
    assert!(h.capture.sender("mouse").unwrap().is_closed());
}

#[tokio::test]
async fn test_reload_swaps_rules_and_restarts() {
    let mut h = harness(&["keyboard", "mouse"], None).await;
    assert_eq!(h.daemon.autoload().await, 2);

    // Broken rules keep the old set.
    common::write_rules(&h.mapping_path, "{ devices: { keyboard: { mappings: [ { input: {type: 1, code: 1} } ] } } }");
    assert!(h.daemon.reload().await.is_err());
    assert_eq!(h.daemon.handlers().len(), 2);
    assert_eq!(h.daemon.supervisor().len(), 2);

    // New rules drop the mouse and remap a different key.
    common::write_rules(
        &h.mapping_path,
        r#"{ devices: { keyboard: { target: "kbd-out", mappings: [
            { input: { type: 1, code: 30 }, output: { type: 1, code: 48 } },
        ] } } }"#,
    );
    assert_eq!(h.daemon.reload().await.unwrap(), 1);
    assert!(h.daemon.supervisor().is_running("keyboard"));
    assert!(!h.daemon.supervisor().is_running("mouse"));
    assert!(!h.daemon.supervisor().registry().is_leased("mouse-out"));

    let tx = h.capture.sender("keyboard").unwrap();
    tx.send(InputEvent::key(30, 1)).await.unwrap();
    assert!(eventually(|| h.backend.emitted("kbd-out") == vec![InputEvent::key(48, 1)]).await);

    h.daemon.shutdown().await;
    assert!(h.daemon.supervisor().is_empty());
}

#[tokio::test]
async fn test_stop_all_with_stuck_worker() {
    let mut h = harness(&["keyboard", "mouse"], None).await;
    h.daemon.autoload().await;

    h.backend.set_stalled(true);
    let tx = h.capture.sender("keyboard").unwrap();
    tx.send(InputEvent::key(30, 1)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let (response, stop) = h.daemon.handle(ControlRequest::StopAll).await;
    assert_eq!(response, ControlResponse::ok_with("stopped 2 devices"));
    assert!(!stop);
    assert!(h.daemon.supervisor().is_empty());
    assert!(h.daemon.supervisor().registry().leased().is_empty());
}

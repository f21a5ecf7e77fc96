//! Shared fixtures for the service integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use input_remapper_service::capture::ChannelCapture;
use input_remapper_service::control::{ControlRequest, ControlResponse, LocalControl};
use input_remapper_service::registry::MemoryBackend;
use input_remapper_service::{Collaborators, Daemon, GlobalConfig};
use remapper_bridge::BridgeSender;
use tempfile::TempDir;

pub const RULES: &str = r#"
{
    devices: {
        keyboard: {
            target: "kbd-out",
            mappings: [
                { input: { type: 1, code: 58 }, output: { type: 1, code: 1 } },
                { input: { type: 1, code: 183 }, action: "lights_toggle" },
            ],
        },
        mouse: { target: "mouse-out", mappings: [] },
    },
}
"#;

pub struct Harness {
    pub daemon: Daemon,
    pub control: LocalControl,
    pub capture: Arc<ChannelCapture>,
    pub backend: MemoryBackend,
    pub mapping_path: PathBuf,
    pub dir: TempDir,
}

pub fn write_rules(path: &Path, rules: &str) {
    std::fs::write(path, rules).unwrap();
}

pub fn config(dir: &Path, autoload: &[&str]) -> GlobalConfig {
    let mut config = GlobalConfig::default();
    config.service.mapping_file = Some(dir.join("mappings.json5"));
    config.service.autoload = autoload.iter().map(|d| d.to_string()).collect();
    config.service.shutdown_grace_ms = 300;
    config.service.liveness_interval_ms = 50;
    config
}

pub fn collaborators() -> (Collaborators, LocalControl, Arc<ChannelCapture>, MemoryBackend) {
    let control = LocalControl::new();
    let capture = Arc::new(ChannelCapture::new(["keyboard", "mouse"]));
    let backend = MemoryBackend::new();
    let collaborators = Collaborators {
        output: Arc::new(backend.clone()),
        capture: capture.clone(),
        control: Arc::new(control.clone()),
    };
    (collaborators, control, capture, backend)
}

pub async fn harness(autoload: &[&str], bridge: Option<BridgeSender>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mapping_path = dir.path().join("mappings.json5");
    write_rules(&mapping_path, RULES);

    let (collaborators, control, capture, backend) = collaborators();
    let daemon = Daemon::bootstrap(config(dir.path(), autoload), collaborators, bridge)
        .await
        .unwrap();

    Harness {
        daemon,
        control,
        capture,
        backend,
        mapping_path,
        dir,
    }
}

/// Send a request through the exposed local control interface.
pub async fn request(control: &LocalControl, request: ControlRequest) -> ControlResponse {
    let client = control.client().expect("control interface not exposed");
    tokio::time::timeout(Duration::from_secs(5), client.request(request))
        .await
        .unwrap()
        .unwrap()
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

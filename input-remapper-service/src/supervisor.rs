//! Ownership of per-device workers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use remapper_bridge::BridgeSender;

use crate::capture::CaptureProvider;
use crate::error::{Result, ServiceError};
use crate::mapping::HandlerChain;
use crate::registry::{DeviceRegistry, endpoint_name};
use crate::worker::{Worker, WorkerExit};

/// Default time a worker gets to stop before it is aborted.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(3);

/// Snapshot of a managed device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device: String,
    pub target: String,
    pub uptime_secs: u64,
}

struct ManagedDevice {
    target: String,
    stop: watch::Sender<bool>,
    task: JoinHandle<WorkerExit>,
    started: Instant,
}

/// Starts, stops and reaps one worker per input device.
///
/// A target endpoint is owned by at most one live worker, and a capture
/// endpoint is read by at most one. The supervisor checks its own entries,
/// and the registry lease catches anything that slips past, such as an
/// aborted worker whose target is not yet released.
pub struct WorkerSupervisor {
    registry: DeviceRegistry,
    capture: Arc<dyn CaptureProvider>,
    bridge: Option<BridgeSender>,
    grace: Duration,
    workers: BTreeMap<String, ManagedDevice>,
}

impl WorkerSupervisor {
    pub fn new(
        registry: DeviceRegistry,
        capture: Arc<dyn CaptureProvider>,
        bridge: Option<BridgeSender>,
    ) -> Self {
        Self {
            registry,
            capture,
            bridge,
            grace: DEFAULT_GRACE,
            workers: BTreeMap::new(),
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn has_bridge(&self) -> bool {
        self.bridge.is_some()
    }

    /// Start a worker for `device` injecting into `target`.
    pub async fn start(&mut self, device: &str, target: &str, chain: HandlerChain) -> Result<()> {
        self.reap().await;

        let input = endpoint_name(device);
        if let Some((owner, existing)) = self
            .workers
            .iter()
            .find(|(running, _)| endpoint_name(running) == input)
        {
            return Err(ServiceError::DeviceConflict {
                device: device.to_string(),
                target: existing.target.clone(),
                owner: owner.clone(),
            });
        }
        let endpoint = endpoint_name(target);
        if let Some((owner, _)) = self
            .workers
            .iter()
            .find(|(_, w)| endpoint_name(&w.target) == endpoint)
        {
            return Err(ServiceError::DeviceConflict {
                device: device.to_string(),
                target: target.to_string(),
                owner: owner.clone(),
            });
        }

        let injection = self
            .registry
            .acquire(target)
            .await
            .map_err(|e| match e {
                ServiceError::TargetBusy(target) => ServiceError::DeviceConflict {
                    device: device.to_string(),
                    target,
                    owner: "unknown".to_string(),
                },
                other => other,
            })?;
        let source = self.capture.open(device).await?;

        let (stop, stop_rx) = watch::channel(false);
        let worker = Worker::new(device, chain, injection, source, self.bridge.clone());
        let task = tokio::spawn(worker.run(stop_rx));

        self.workers.insert(
            device.to_string(),
            ManagedDevice {
                target: target.to_string(),
                stop,
                task,
                started: Instant::now(),
            },
        );

        tracing::info!(device = %device, output = %target, "Device started");
        Ok(())
    }

    /// Stop the worker of `device`. Returns false if it was not managed.
    pub async fn stop(&mut self, device: &str) -> bool {
        let Some(worker) = self.workers.remove(device) else {
            tracing::debug!(device = %device, "Stop requested for unmanaged device");
            return false;
        };

        signal_stop(device, &worker);
        finish(device, worker, Instant::now() + self.grace).await;
        true
    }

    /// Stop every worker against one shared deadline.
    pub async fn stop_all(&mut self) {
        let workers = std::mem::take(&mut self.workers);
        if workers.is_empty() {
            return;
        }

        tracing::info!(count = workers.len(), "Stopping all devices");
        for (device, worker) in &workers {
            signal_stop(device, worker);
        }

        let deadline = Instant::now() + self.grace;
        for (device, worker) in workers {
            finish(&device, worker, deadline).await;
        }
    }

    /// Remove workers that have exited on their own. Returns how many.
    pub async fn reap(&mut self) -> usize {
        let finished: Vec<String> = self
            .workers
            .iter()
            .filter(|(_, w)| w.task.is_finished())
            .map(|(device, _)| device.clone())
            .collect();

        for device in &finished {
            if let Some(worker) = self.workers.remove(device) {
                log_exit(device, worker.task.await);
            }
        }
        finished.len()
    }

    pub fn is_running(&self, device: &str) -> bool {
        self.workers.contains_key(device)
    }

    /// Managed device ids, sorted.
    pub fn running(&self) -> Vec<String> {
        self.workers.keys().cloned().collect()
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.workers
            .iter()
            .map(|(device, w)| DeviceInfo {
                device: device.clone(),
                target: w.target.clone(),
                uptime_secs: w.started.elapsed().as_secs(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

fn signal_stop(device: &str, worker: &ManagedDevice) {
    if worker.stop.send(true).is_err() {
        tracing::debug!(device = %device, "Worker already exited");
    }
}

async fn finish(device: &str, mut worker: ManagedDevice, deadline: Instant) {
    match tokio::time::timeout_at(deadline, &mut worker.task).await {
        Ok(result) => log_exit(device, result),
        Err(_) => {
            tracing::warn!(device = %device, "Worker did not stop in time, aborting");
            worker.task.abort();
            // Wait for the abort so the target lease is released on return.
            if let Err(e) = worker.task.await {
                if e.is_panic() {
                    tracing::warn!(device = %device, "Worker panicked while being aborted");
                }
            }
        }
    }
}

fn log_exit(device: &str, result: std::result::Result<WorkerExit, JoinError>) {
    match result {
        Ok(exit) => tracing::info!(device = %device, exit = ?exit, "Worker exited"),
        Err(e) if e.is_panic() => {
            tracing::warn!(device = %device, error = %e, "Worker panicked, device released")
        }
        Err(e) => tracing::debug!(device = %device, error = %e, "Worker cancelled"),
    }
}

//! The service orchestrator.
//!
//! Startup runs in fixed stages (see [`StartupStage`]). A [`Daemon`] can only
//! be built from an existing configuration, handler set and supervisor, so
//! the control interface is never published before those exist.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use remapper_bridge::BridgeSender;
use remapper_common::ConfigFile;

use crate::capture::CaptureProvider;
use crate::config::GlobalConfig;
use crate::control::{
    self, ControlClient, ControlEnvelope, ControlRequest, ControlResponse, ControlTransport,
    ExposedControl,
};
use crate::error::{Result, ServiceError};
use crate::mapping::{HandlerSet, MappingRules};
use crate::registry::{DeviceRegistry, OutputBackend};
use crate::supervisor::WorkerSupervisor;

/// Pending control requests the daemon buffers.
const CONTROL_QUEUE: usize = 16;

/// Startup stage, attached as context to fatal startup errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStage {
    Config,
    Registry,
    HandlerSet,
    Daemon,
    Control,
}

impl fmt::Display for StartupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Config => "loading configuration",
            Self::Registry => "constructing device registry",
            Self::HandlerSet => "building handler set",
            Self::Daemon => "constructing daemon",
            Self::Control => "publishing control interface",
        };
        write!(f, "startup failed while {}", name)
    }
}

/// External collaborators the daemon is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub output: Arc<dyn OutputBackend>,
    pub capture: Arc<dyn CaptureProvider>,
    pub control: Arc<dyn ControlTransport>,
}

/// Owns the workers and answers control requests.
pub struct Daemon {
    config: GlobalConfig,
    mapping_path: PathBuf,
    handlers: HandlerSet,
    supervisor: WorkerSupervisor,
    control: Arc<dyn ControlTransport>,
    exposed: Option<Box<dyn ExposedControl>>,
    client: ControlClient,
    requests: mpsc::Receiver<ControlEnvelope>,
    started: Instant,
}

impl Daemon {
    /// Run startup stages from registry construction to control publication.
    pub async fn bootstrap(
        config: GlobalConfig,
        collaborators: Collaborators,
        bridge: Option<BridgeSender>,
    ) -> anyhow::Result<Self> {
        let registry = DeviceRegistry::new(collaborators.output);
        tracing::debug!("Device registry ready");

        let mapping_path = config.mapping_path();
        let handlers = MappingRules::load_or_default(&mapping_path)
            .map_err(ServiceError::from)
            .and_then(|rules| HandlerSet::build(&rules, &registry))
            .with_context(|| format!("mapping rules '{}'", mapping_path.display()))
            .context(StartupStage::HandlerSet)?;
        tracing::info!(devices = handlers.len(), "Handler set built");

        let supervisor = WorkerSupervisor::new(registry, collaborators.capture, bridge)
            .with_grace(config.shutdown_grace());
        let mut daemon = Self::new(config, mapping_path, handlers, supervisor, collaborators.control);

        daemon
            .publish_control()
            .await
            .context(StartupStage::Control)?;

        Ok(daemon)
    }

    pub fn new(
        config: GlobalConfig,
        mapping_path: PathBuf,
        handlers: HandlerSet,
        supervisor: WorkerSupervisor,
        control: Arc<dyn ControlTransport>,
    ) -> Self {
        let (client, requests) = control::channel(CONTROL_QUEUE);
        Self {
            config,
            mapping_path,
            handlers,
            supervisor,
            control,
            exposed: None,
            client,
            requests,
            started: Instant::now(),
        }
    }

    /// Publish the control interface. Publishing twice is a no-op.
    pub async fn publish_control(&mut self) -> Result<()> {
        if self.exposed.is_some() {
            tracing::debug!("Control interface already published");
            return Ok(());
        }
        let exposed = self.control.expose(self.client.clone()).await?;
        self.exposed = Some(exposed);
        Ok(())
    }

    pub fn is_published(&self) -> bool {
        self.exposed.is_some()
    }

    pub fn handlers(&self) -> &HandlerSet {
        &self.handlers
    }

    pub fn supervisor(&self) -> &WorkerSupervisor {
        &self.supervisor
    }

    /// Start every device listed in `service.autoload`.
    ///
    /// Failures are logged and do not stop the remaining devices.
    pub async fn autoload(&mut self) -> usize {
        let devices = self.config.service.autoload.clone();
        let mut started = 0;
        for device in &devices {
            match self.start_device(device).await {
                Ok(()) => started += 1,
                Err(e) => tracing::warn!(device = %device, error = %e, "Autoload failed"),
            }
        }
        if !devices.is_empty() {
            tracing::info!(started, configured = devices.len(), "Autoload complete");
        }
        started
    }

    pub async fn start_device(&mut self, device: &str) -> Result<()> {
        let handlers = self
            .handlers
            .get(device)
            .ok_or_else(|| ServiceError::UnknownDevice(device.to_string()))?;
        let (target, chain) = (handlers.target.clone(), handlers.chain.clone());
        self.supervisor.start(device, &target, chain).await
    }

    pub async fn stop_device(&mut self, device: &str) -> bool {
        self.supervisor.stop(device).await
    }

    /// Re-read the mapping rules and restart running devices on the new set.
    ///
    /// On error the current set stays in place. Returns the number of
    /// devices running afterwards.
    pub async fn reload(&mut self) -> Result<usize> {
        let rules = MappingRules::load_or_default(&self.mapping_path)?;
        let handlers = HandlerSet::build(&rules, self.supervisor.registry())?;
        self.handlers = handlers;
        tracing::info!(devices = self.handlers.len(), "Mapping rules reloaded");

        let running = self.supervisor.running();
        for device in &running {
            self.supervisor.stop(device).await;
        }
        for device in &running {
            if self.handlers.get(device).is_none() {
                tracing::info!(device = %device, "Device has no rules any more, left stopped");
                continue;
            }
            if let Err(e) = self.start_device(device).await {
                tracing::warn!(device = %device, error = %e, "Failed to restart device after reload");
            }
        }
        Ok(self.supervisor.len())
    }

    /// Answer one control request. The flag is true when the service should stop.
    pub async fn handle(&mut self, request: ControlRequest) -> (ControlResponse, bool) {
        tracing::debug!(request = ?request, "Control request");
        let response = match request {
            ControlRequest::StartDevice { device } => match self.start_device(&device).await {
                Ok(()) => ControlResponse::ok_with(format!("started {}", device)),
                Err(e) => ControlResponse::error(e.to_string()),
            },
            ControlRequest::StopDevice { device } => {
                if self.stop_device(&device).await {
                    ControlResponse::ok_with(format!("stopped {}", device))
                } else {
                    ControlResponse::error(format!("device '{}' is not running", device))
                }
            }
            ControlRequest::StopAll => {
                let count = self.supervisor.len();
                self.supervisor.stop_all().await;
                ControlResponse::ok_with(format!("stopped {} devices", count))
            }
            ControlRequest::ListDevices => ControlResponse::Devices {
                devices: self.supervisor.devices(),
            },
            ControlRequest::Reload => match self.reload().await {
                Ok(running) => ControlResponse::ok_with(format!("reloaded, {} devices running", running)),
                Err(e) => ControlResponse::error(e.to_string()),
            },
            ControlRequest::Status => ControlResponse::Status {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: self.started.elapsed().as_secs(),
                running: self.supervisor.running(),
                configured: self.handlers.devices().map(str::to_string).collect(),
                bridge: self.supervisor.has_bridge(),
            },
            ControlRequest::Shutdown => return (ControlResponse::ok_with("shutting down"), true),
        };
        (response, false)
    }

    /// Autoload devices, then serve until `shutdown` resolves or a shutdown
    /// request arrives. Shuts down in order before returning.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        self.autoload().await;

        let mut liveness = tokio::time::interval(self.config.liveness_interval());
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!("Service running");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Received shutdown signal");
                    break;
                }
                envelope = self.requests.recv() => {
                    let Some(ControlEnvelope { request, reply }) = envelope else {
                        break;
                    };
                    let (response, stop) = self.handle(request).await;
                    if reply.send(response).is_err() {
                        tracing::debug!("Control requester went away");
                    }
                    if stop {
                        tracing::info!("Shutdown requested over control interface");
                        break;
                    }
                }
                _ = liveness.tick() => {
                    let reaped = self.supervisor.reap().await;
                    if reaped > 0 {
                        tracing::debug!(reaped, "Reaped finished workers");
                    }
                }
            }
        }

        self.shutdown().await;
    }

    /// Stop accepting requests, then stop every worker.
    pub async fn shutdown(&mut self) {
        if let Some(exposed) = self.exposed.take() {
            exposed.close().await;
        }
        self.supervisor.stop_all().await;
        tracing::info!("Daemon stopped");
    }
}

//! Process entry: runtime, tracing, bridge lifecycle and exit codes.

use std::future::Future;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use remapper_bridge::{
    BridgeConfig, BridgeError, BridgeForwarder, BridgeHandle, BridgeSender, EventBridgeClient,
};
use remapper_common::{ConfigFile, LoggingConfig, init_tracing};

use crate::args::ServiceArgs;
use crate::config::GlobalConfig;
use crate::daemon::{Collaborators, Daemon, StartupStage};
use crate::zenoh_io::{ZenohCapture, ZenohControl, ZenohOutputBackend};

/// Final outcome of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceExit {
    /// Stopped normally, including after SIGINT/SIGTERM.
    Clean,
    /// A fatal error or panic ended the service.
    Failed,
}

impl ServiceExit {
    pub fn code(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::Failed => 1,
        }
    }
}

impl From<ServiceExit> for ExitCode {
    fn from(exit: ServiceExit) -> Self {
        ExitCode::from(exit.code())
    }
}

/// Build the runtime and run the service to completion.
pub fn run(args: ServiceArgs) -> ServiceExit {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("input-remapper")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            return ServiceExit::Failed;
        }
    };
    runtime.block_on(run_async(args))
}

async fn run_async(args: ServiceArgs) -> ServiceExit {
    let config_path = args.config_path();
    let loaded = GlobalConfig::load_or_default(&config_path);

    let base_logging = match &loaded {
        Ok(config) => config.logging.clone(),
        Err(_) => LoggingConfig::default(),
    };
    if let Err(e) = init_tracing(&args.logging(&base_logging)) {
        eprintln!("{}", e);
    }

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(
                path = %config_path.display(),
                error = %e,
                "{}",
                StartupStage::Config
            );
            return ServiceExit::Failed;
        }
    };

    if !args.hide_info {
        tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting input-remapper service");
    }

    let mqtt_path = args.mqtt_config_path(&config);
    if args.test_mqtt {
        return test_mqtt(&mqtt_path).await;
    }

    let shutdown = match shutdown_signal() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install signal handlers");
            return ServiceExit::Failed;
        }
    };

    let (bridge, sender) = match init_bridge(&mqtt_path, config.service.bridge_queue) {
        Some((handle, sender)) => (Some(handle), Some(sender)),
        None => (None, None),
    };

    run_guarded(bridge, run_service(config, sender, shutdown)).await
}

/// Build the MQTT bridge. Any failure disables it and is logged once.
pub fn init_bridge(path: &Path, queue: usize) -> Option<(BridgeHandle, BridgeSender)> {
    let config = match BridgeConfig::load(path) {
        Ok(config) => config,
        Err(BridgeError::ConfigNotFound { path }) => {
            tracing::info!(path = %path, "No MQTT configuration, event bridge disabled");
            return None;
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Event bridge disabled");
            return None;
        }
    };

    match EventBridgeClient::new(config) {
        Ok(client) => {
            tracing::info!(
                broker = %client.config().endpoint(),
                topic = %client.config().topic,
                "Event bridge enabled"
            );
            Some(BridgeForwarder::spawn(client, queue))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Event bridge disabled");
            None
        }
    }
}

/// Run `service` as a task and always shut the bridge down afterwards.
///
/// A panic in the service is caught at the task boundary.
pub async fn run_guarded<F>(bridge: Option<BridgeHandle>, service: F) -> ServiceExit
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let exit = match tokio::spawn(service).await {
        Ok(Ok(())) => {
            tracing::info!("Service stopped");
            ServiceExit::Clean
        }
        Ok(Err(e)) => {
            tracing::error!(error = %format!("{:#}", e), "Service failed");
            ServiceExit::Failed
        }
        Err(e) if e.is_panic() => {
            tracing::error!(error = %e, "Service panicked");
            ServiceExit::Failed
        }
        Err(e) => {
            tracing::error!(error = %e, "Service task cancelled");
            ServiceExit::Failed
        }
    };

    if let Some(bridge) = bridge {
        bridge.shutdown().await;
    }
    exit
}

/// Connect to Zenoh, start the daemon and serve until `shutdown`.
///
/// `shutdown` is watched from the first step on. If it resolves before the
/// daemon is running, startup is abandoned and the service stops cleanly.
pub async fn run_service<S>(
    config: GlobalConfig,
    bridge: Option<BridgeSender>,
    shutdown: S,
) -> anyhow::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let mut shutdown = Box::pin(shutdown);
    let keys = config.keys().context(StartupStage::Registry)?;

    let session = tokio::select! {
        biased;
        _ = &mut shutdown => {
            tracing::info!("Interrupted while connecting to Zenoh");
            return Ok(());
        }
        session = remapper_common::connect(&config.zenoh) => {
            Arc::new(session.context(StartupStage::Registry)?)
        }
    };
    tracing::info!(zid = %session.zid(), "Connected to Zenoh");

    let output = ZenohOutputBackend::new(session.clone(), keys.clone())
        .with_format(config.service.inject_format);
    let collaborators = Collaborators {
        output: Arc::new(output),
        capture: Arc::new(ZenohCapture::new(session.clone(), keys.clone())),
        control: Arc::new(ZenohControl::new(session.clone(), keys)),
    };

    let bootstrapped = tokio::select! {
        biased;
        _ = &mut shutdown => None,
        daemon = Daemon::bootstrap(config, collaborators, bridge) => Some(daemon),
    };
    let result = match bootstrapped {
        Some(Ok(daemon)) => {
            daemon.run(shutdown).await;
            Ok(())
        }
        Some(Err(e)) => Err(e),
        None => {
            tracing::info!("Interrupted during startup");
            Ok(())
        }
    };

    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "Error closing Zenoh session");
    }
    result
}

/// Install SIGINT and SIGTERM listeners and return a future that resolves
/// on either.
///
/// The listeners are registered before this returns, so a signal that
/// arrives before the future is first polled is not lost.
#[cfg(unix)]
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => tracing::info!("Received SIGINT"),
            _ = terminate.recv() => tracing::info!("Received SIGTERM"),
        }
    })
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    })
}

/// `--test-mqtt`: load the bridge configuration and probe the broker.
pub async fn test_mqtt(path: &Path) -> ServiceExit {
    let client = match BridgeConfig::load(path).and_then(EventBridgeClient::new) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Cannot test MQTT connection");
            println!("{}", e);
            return ServiceExit::Failed;
        }
    };
    probe_broker(client).await
}

/// Run the connect/publish/disconnect check and report the outcome.
pub async fn probe_broker(mut client: EventBridgeClient) -> ServiceExit {
    let (ok, message) = client.test_connection().await;
    println!("{}", message);
    if ok {
        ServiceExit::Clean
    } else {
        ServiceExit::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ServiceExit::Clean.code(), 0);
        assert_eq!(ServiceExit::Failed.code(), 1);
    }

    #[tokio::test]
    async fn test_run_guarded_without_bridge() {
        assert_eq!(run_guarded(None, async { Ok(()) }).await, ServiceExit::Clean);
        assert_eq!(
            run_guarded(None, async { Err(anyhow::anyhow!("boom")) }).await,
            ServiceExit::Failed
        );
    }

    #[tokio::test]
    async fn test_shutdown_signal_installs() {
        let shutdown = shutdown_signal().unwrap();
        let pending = tokio::time::timeout(std::time::Duration::from_millis(20), shutdown).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_interrupt_before_connect_stops_cleanly() {
        let mut config = GlobalConfig::default();
        config.zenoh.mode = "client".to_string();
        config.zenoh.connect = vec!["tcp/127.0.0.1:9".to_string()];

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            run_service(config, None, std::future::ready(())),
        )
        .await
        .unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_bridge_config_disables_bridge() {
        let dir = tempfile::tempdir().unwrap();
        assert!(init_bridge(&dir.path().join("mqtt_config.json"), 8).is_none());
    }

    #[test]
    fn test_invalid_bridge_config_disables_bridge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mqtt_config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(init_bridge(&path, 8).is_none());
    }
}

//! Control requests and the transports exposing them.
//!
//! The daemon receives requests through a [`ControlClient`] channel and
//! answers each one before taking the next. A [`ControlTransport`] makes the
//! client reachable from outside the process.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, ServiceError};
use crate::supervisor::DeviceInfo;

/// Request sent to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Start remapping a configured device.
    StartDevice { device: String },
    /// Stop remapping a device.
    StopDevice { device: String },
    /// Stop every device.
    StopAll,
    /// List running devices.
    ListDevices,
    /// Re-read the mapping rules and restart running devices.
    Reload,
    /// Report service status.
    Status,
    /// Stop the service.
    Shutdown,
}

/// Answer to a [`ControlRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlResponse {
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Devices {
        devices: Vec<DeviceInfo>,
    },
    Status {
        version: String,
        uptime_secs: u64,
        running: Vec<String>,
        configured: Vec<String>,
        bridge: bool,
    },
    Error {
        message: String,
    },
}

impl ControlResponse {
    pub fn ok() -> Self {
        Self::Ok { message: None }
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self::Ok {
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// A request paired with the channel its answer goes to.
#[derive(Debug)]
pub struct ControlEnvelope {
    pub request: ControlRequest,
    pub reply: oneshot::Sender<ControlResponse>,
}

/// Create a request channel holding at most `capacity` pending requests.
pub fn channel(capacity: usize) -> (ControlClient, mpsc::Receiver<ControlEnvelope>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ControlClient { tx }, rx)
}

/// Sends requests to the daemon.
#[derive(Debug, Clone)]
pub struct ControlClient {
    tx: mpsc::Sender<ControlEnvelope>,
}

impl ControlClient {
    /// Send a request and wait for its answer.
    pub async fn request(&self, request: ControlRequest) -> Result<ControlResponse> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(ControlEnvelope { request, reply })
            .await
            .map_err(|_| ServiceError::control("service is not accepting requests"))?;
        answer
            .await
            .map_err(|_| ServiceError::control("service dropped the request"))
    }
}

/// Makes a [`ControlClient`] reachable by other processes.
#[async_trait]
pub trait ControlTransport: Send + Sync {
    async fn expose(&self, client: ControlClient) -> Result<Box<dyn ExposedControl>>;
}

/// A published control interface.
#[async_trait]
pub trait ExposedControl: Send {
    /// Stop accepting requests and withdraw the interface.
    async fn close(self: Box<Self>);
}

/// In-process transport: the exposed client is handed back to the caller.
#[derive(Debug, Clone, Default)]
pub struct LocalControl {
    slot: Arc<Mutex<Option<ControlClient>>>,
    exposures: Arc<AtomicUsize>,
}

impl LocalControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// The client while the interface is exposed.
    pub fn client(&self) -> Option<ControlClient> {
        self.slot.lock().clone()
    }

    /// How many times the interface has been exposed.
    pub fn exposures(&self) -> usize {
        self.exposures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlTransport for LocalControl {
    async fn expose(&self, client: ControlClient) -> Result<Box<dyn ExposedControl>> {
        *self.slot.lock() = Some(client);
        self.exposures.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LocalExposed {
            slot: self.slot.clone(),
        }))
    }
}

struct LocalExposed {
    slot: Arc<Mutex<Option<ControlClient>>>,
}

#[async_trait]
impl ExposedControl for LocalExposed {
    async fn close(self: Box<Self>) {
        self.slot.lock().take();
    }
}

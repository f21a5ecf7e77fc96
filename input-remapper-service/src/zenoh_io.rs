//! Zenoh implementations of the capture, output and control seams.
//!
//! | Seam | Key |
//! |---|---|
//! | [`ZenohCapture`] | `<prefix>/devices/<device>/capture` (subscribed) |
//! | [`ZenohOutputBackend`] | `<prefix>/targets/<target>/inject` (published) |
//! | [`ZenohControl`] | `<prefix>/@/control` (queryable), `@/alive`, `@/status` |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use zenoh::Session;
use zenoh::liveliness::LivelinessToken;

use remapper_common::{Format, InputEvent, KeyExprBuilder, decode_auto, encode};

use crate::capture::{CAPTURE_QUEUE, CaptureProvider, ChannelSource, EventSource};
use crate::control::{ControlClient, ControlRequest, ControlResponse, ControlTransport, ExposedControl};
use crate::error::{Result, ServiceError};
use crate::registry::{OutputBackend, VirtualOutput};
use crate::status::StatusPublisher;

/// How long the query task may take to finish after close.
const CONTROL_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Receives raw events published by an external capture agent.
#[derive(Clone)]
pub struct ZenohCapture {
    session: Arc<Session>,
    keys: KeyExprBuilder,
}

impl ZenohCapture {
    pub fn new(session: Arc<Session>, keys: KeyExprBuilder) -> Self {
        Self { session, keys }
    }
}

#[async_trait]
impl CaptureProvider for ZenohCapture {
    async fn open(&self, device: &str) -> Result<Box<dyn EventSource>> {
        let key = self.keys.capture_key(device);
        let subscriber = self
            .session
            .declare_subscriber(&key)
            .await
            .map_err(|e| ServiceError::capture(format!("subscribe to {}: {}", key, e)))?;

        let (tx, rx) = mpsc::channel(CAPTURE_QUEUE);
        let device = device.to_string();
        let feeder = tokio::spawn(async move {
            while let Ok(sample) = subscriber.recv_async().await {
                let payload = sample.payload().to_bytes();
                match decode_auto::<InputEvent>(&payload) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(device = %device, error = %e, "Dropping undecodable input event");
                    }
                }
            }
        });

        tracing::debug!(key = %key, "Capture subscribed");
        Ok(Box::new(ChannelSource::new(rx).with_feeder(feeder)))
    }
}

/// Publishes remapped events for an external injector.
#[derive(Clone)]
pub struct ZenohOutputBackend {
    session: Arc<Session>,
    keys: KeyExprBuilder,
    format: Format,
}

impl ZenohOutputBackend {
    pub fn new(session: Arc<Session>, keys: KeyExprBuilder) -> Self {
        Self {
            session,
            keys,
            format: Format::Json,
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }
}

#[async_trait]
impl OutputBackend for ZenohOutputBackend {
    fn supports(&self, target: &str) -> bool {
        !target.trim().is_empty() && target != "@"
    }

    async fn create(&self, target: &str) -> Result<Box<dyn VirtualOutput>> {
        Ok(Box::new(ZenohOutput {
            session: self.session.clone(),
            key: self.keys.inject_key(target),
            format: self.format,
        }))
    }
}

struct ZenohOutput {
    session: Arc<Session>,
    key: String,
    format: Format,
}

#[async_trait]
impl VirtualOutput for ZenohOutput {
    async fn emit(&mut self, event: &InputEvent) -> Result<()> {
        let payload = encode(event, self.format)?;
        self.session
            .put(&self.key, payload)
            .await
            .map_err(|e| ServiceError::injection(format!("{}: {}", self.key, e)))
    }
}

/// Control interface as a Zenoh queryable.
///
/// While exposed, the service holds a liveliness token at `<prefix>/@/alive`.
/// A `running` status sample is published on expose and `offline` on close.
pub struct ZenohControl {
    session: Arc<Session>,
    keys: KeyExprBuilder,
    version: String,
}

impl ZenohControl {
    pub fn new(session: Arc<Session>, keys: KeyExprBuilder) -> Self {
        Self {
            session,
            keys,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[async_trait]
impl ControlTransport for ZenohControl {
    async fn expose(&self, client: ControlClient) -> Result<Box<dyn ExposedControl>> {
        let control_key = self.keys.control_key();
        let queryable = self
            .session
            .declare_queryable(&control_key)
            .await
            .map_err(|e| ServiceError::control(format!("declare {}: {}", control_key, e)))?;

        let alive_key = self.keys.alive_key();
        let token = self
            .session
            .liveliness()
            .declare_token(&alive_key)
            .await
            .map_err(|e| ServiceError::control(format!("declare {}: {}", alive_key, e)))?;

        let status = StatusPublisher::new(
            self.session.clone(),
            self.keys.status_key(),
            &self.version,
        );
        let metadata = serde_json::json!({ "control": control_key });
        if let Err(e) = status.publish_running(Some(metadata)).await {
            tracing::warn!(error = %e, "Failed to publish running status");
        }

        let (stop, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    query = queryable.recv_async() => {
                        let Ok(query) = query else { break };
                        let decoded = match query.payload() {
                            Some(payload) => decode_auto::<ControlRequest>(&payload.to_bytes())
                                .map_err(|e| format!("invalid request: {}", e)),
                            None => Err("empty request".to_string()),
                        };
                        let response = match decoded {
                            Ok(request) => client
                                .request(request)
                                .await
                                .unwrap_or_else(|e| ControlResponse::error(e.to_string())),
                            Err(message) => ControlResponse::error(message),
                        };
                        match encode(&response, Format::Json) {
                            Ok(bytes) => {
                                if let Err(e) = query.reply(query.key_expr().clone(), bytes).await {
                                    tracing::warn!(error = %e, "Failed to answer control query");
                                }
                            }
                            Err(e) => tracing::warn!(error = %e, "Failed to encode control response"),
                        }
                    }
                }
            }
        });

        tracing::info!(key = %control_key, "Control interface published");
        Ok(Box::new(ZenohExposed {
            stop,
            task,
            token,
            status,
        }))
    }
}

struct ZenohExposed {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    token: LivelinessToken,
    status: StatusPublisher,
}

#[async_trait]
impl ExposedControl for ZenohExposed {
    async fn close(self: Box<Self>) {
        let Self {
            stop,
            mut task,
            token,
            status,
        } = *self;

        if stop.send(true).is_err() {
            tracing::debug!("Control task already exited");
        }
        if tokio::time::timeout(CONTROL_CLOSE_GRACE, &mut task).await.is_err() {
            tracing::warn!("Control task did not stop in time, aborting");
            task.abort();
        }

        // Dropping the token withdraws the liveliness declaration.
        drop(token);
        if let Err(e) = status.publish_offline().await {
            tracing::warn!(error = %e, "Failed to publish offline status");
        }
        tracing::info!("Control interface closed");
    }
}

/// Send one request to a service's control queryable.
pub async fn query_control(
    session: &Session,
    keys: &KeyExprBuilder,
    request: &ControlRequest,
    timeout: Duration,
) -> Result<ControlResponse> {
    let payload = encode(request, Format::Json)?;
    let replies = session.get(keys.control_key()).payload(payload).await?;

    let reply = tokio::time::timeout(timeout, replies.recv_async())
        .await
        .map_err(|_| ServiceError::control("no reply from service"))?
        .map_err(|e| ServiceError::control(format!("no reply from service: {}", e)))?;

    match reply.result() {
        Ok(sample) => Ok(decode_auto(&sample.payload().to_bytes())?),
        Err(e) => Err(ServiceError::control(format!("error reply: {:?}", e))),
    }
}

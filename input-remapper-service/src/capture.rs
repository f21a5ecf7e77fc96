//! Sources of raw input events.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use remapper_common::InputEvent;

use crate::error::{Result, ServiceError};

/// Buffered events per capture source.
pub const CAPTURE_QUEUE: usize = 256;

/// Opens capture sources for input devices.
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    async fn open(&self, device: &str) -> Result<Box<dyn EventSource>>;
}

/// A stream of events from one device.
#[async_trait]
pub trait EventSource: Send {
    /// Next event, or `None` once the device is gone.
    async fn next_event(&mut self) -> Option<InputEvent>;
}

/// [`EventSource`] fed through a channel.
///
/// When a feeder task is attached, it is aborted when the source is dropped.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<InputEvent>,
    feeder: Option<JoinHandle<()>>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<InputEvent>) -> Self {
        Self { rx, feeder: None }
    }

    /// Tie the lifetime of `feeder` to this source.
    pub fn with_feeder(mut self, feeder: JoinHandle<()>) -> Self {
        self.feeder = Some(feeder);
        self
    }
}

impl Drop for ChannelSource {
    fn drop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn next_event(&mut self) -> Option<InputEvent> {
        self.rx.recv().await
    }
}

/// In-process capture: events are pushed through [`ChannelCapture::sender`].
///
/// Only devices registered up front can be opened. Each `open` creates a
/// fresh channel, so a sender obtained before a restart goes stale.
#[derive(Debug, Default)]
pub struct ChannelCapture {
    known: HashSet<String>,
    senders: Mutex<HashMap<String, mpsc::Sender<InputEvent>>>,
}

impl ChannelCapture {
    pub fn new<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: devices.into_iter().map(Into::into).collect(),
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Sender feeding the currently open source of `device`.
    pub fn sender(&self, device: &str) -> Option<mpsc::Sender<InputEvent>> {
        self.senders.lock().get(device).cloned()
    }

    /// Close the source of `device`, as if it had been unplugged.
    pub fn unplug(&self, device: &str) {
        self.senders.lock().remove(device);
    }
}

#[async_trait]
impl CaptureProvider for ChannelCapture {
    async fn open(&self, device: &str) -> Result<Box<dyn EventSource>> {
        if !self.known.contains(device) {
            return Err(ServiceError::capture(format!("no such device: {}", device)));
        }
        let (tx, rx) = mpsc::channel(CAPTURE_QUEUE);
        self.senders.lock().insert(device.to_string(), tx);
        Ok(Box::new(ChannelSource::new(rx)))
    }
}

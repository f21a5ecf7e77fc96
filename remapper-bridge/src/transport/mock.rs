//! In-memory transport for tests.
//!
//! [`MockTransport`] records every call. The paired [`MockProbe`] lets a
//! test inspect those calls and inject failures after the transport has been
//! moved into a client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::Transport;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

/// A message accepted by the mock broker.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub qos: u8,
    pub retain: bool,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    /// Decode the payload as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Default)]
struct MockState {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    hang_connect: AtomicBool,
    fail_publish: AtomicBool,
    fail_disconnect: AtomicBool,
    last_endpoint: Mutex<Option<String>>,
    published: Mutex<Vec<PublishedMessage>>,
}

/// Transport that never touches the network.
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<MockState>,
}

/// Observer and failure switchboard for a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockProbe {
    state: Arc<MockState>,
}

impl MockTransport {
    /// Create a transport together with its probe.
    pub fn new() -> (Self, MockProbe) {
        let state = Arc::new(MockState::default());
        (
            Self {
                state: state.clone(),
            },
            MockProbe { state },
        )
    }

    /// Create a boxed transport together with its probe.
    pub fn boxed() -> (Box<dyn Transport>, MockProbe) {
        let (transport, probe) = Self::new();
        (Box::new(transport), probe)
    }
}

impl MockProbe {
    /// Number of `connect` calls, successful or not.
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Number of `disconnect` calls, successful or not.
    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    /// Whether a session is currently open.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// `host:port` used by the most recent `connect`.
    pub fn last_endpoint(&self) -> Option<String> {
        self.state.last_endpoint.lock().clone()
    }

    /// Messages accepted so far.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.published.lock().clone()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make `connect` wait forever, so only the caller's timeout ends it.
    pub fn set_hang_connect(&self, hang: bool) {
        self.state.hang_connect.store(hang, Ordering::SeqCst);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.state.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_disconnect(&self, fail: bool) {
        self.state.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    /// Simulate the broker dropping the session.
    pub fn drop_connection(&self) {
        self.state.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, config: &BridgeConfig) -> Result<()> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        *self.state.last_endpoint.lock() = Some(config.endpoint());

        if self.state.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.state.fail_connect.load(Ordering::SeqCst) {
            self.state.connected.store(false, Ordering::SeqCst);
            return Err(BridgeError::connectivity("connection refused"));
        }

        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        qos: u8,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<()> {
        if !self.state.connected.load(Ordering::SeqCst) {
            return Err(BridgeError::publish(topic, "not connected"));
        }
        if self.state.fail_publish.load(Ordering::SeqCst) {
            return Err(BridgeError::publish(topic, "broker rejected message"));
        }

        self.state.published.lock().push(PublishedMessage {
            topic: topic.to_string(),
            qos,
            retain,
            payload,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        self.state.connected.store(false, Ordering::SeqCst);

        if self.state.fail_disconnect.load(Ordering::SeqCst) {
            return Err(BridgeError::connectivity("socket closed unexpectedly"));
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }
}

//! MQTT transport backed by `rumqttc`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::task::JoinHandle;

use super::Transport;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

/// Capacity of the request channel between client and event loop.
const REQUEST_CAPACITY: usize = 64;

/// How long to wait for the event loop to flush a DISCONNECT.
const DRIVER_SHUTDOWN: Duration = Duration::from_secs(1);

/// An open broker session.
struct Session {
    client: AsyncClient,
    alive: Arc<AtomicBool>,
    driver: JoinHandle<()>,
}

/// [`Transport`] speaking MQTT 3.1.1 over TCP.
///
/// Reconnection is left to the caller: when the connection drops, the event
/// loop driver stops and [`is_alive`](Transport::is_alive) turns false.
pub struct MqttTransport {
    client_id: String,
    keep_alive: Duration,
    session: Option<Session>,
}

impl MqttTransport {
    /// Create a transport that identifies itself with `client_id`.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(30),
            session: None,
        }
    }

    /// Client id derived from the process id, unique per running service.
    pub fn process_client_id() -> String {
        format!("input-remapper-{}", std::process::id())
    }

    fn discard_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.driver.abort();
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.discard_session();
    }
}

fn qos_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

/// Poll the event loop until the broker answers the CONNECT.
async fn await_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(BridgeError::connectivity(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )))
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(BridgeError::connectivity(e.to_string())),
        }
    }
}

/// Keep the session flowing until it is closed or fails.
async fn drive(mut eventloop: EventLoop, alive: Arc<AtomicBool>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT session closed");
                break;
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                tracing::trace!(pkid = ack.pkid, "Broker acknowledged publish");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "MQTT connection lost");
                break;
            }
        }
    }
    alive.store(false, Ordering::Release);
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self, config: &BridgeConfig) -> Result<()> {
        self.discard_session();

        let mut options = MqttOptions::new(self.client_id.clone(), config.broker.clone(), config.port);
        options.set_keep_alive(self.keep_alive);
        if let Some(username) = &config.username {
            options.set_credentials(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            );
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        await_connack(&mut eventloop).await?;

        let alive = Arc::new(AtomicBool::new(true));
        let driver = tokio::spawn(drive(eventloop, alive.clone()));
        self.session = Some(Session {
            client,
            alive,
            driver,
        });

        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        qos: u8,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<()> {
        let session = self
            .session
            .as_ref()
            .filter(|s| s.alive.load(Ordering::Acquire))
            .ok_or_else(|| BridgeError::publish(topic, "no open MQTT session"))?;

        session
            .client
            .publish(topic, qos_level(qos), retain, payload)
            .await
            .map_err(|e| BridgeError::publish(topic, e.to_string()))
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        let result = session
            .client
            .disconnect()
            .await
            .map_err(|e| BridgeError::connectivity(format!("failed to send DISCONNECT: {}", e)));

        if tokio::time::timeout(DRIVER_SHUTDOWN, &mut session.driver)
            .await
            .is_err()
        {
            tracing::debug!("MQTT event loop did not stop in time, aborting");
            session.driver.abort();
        }

        result
    }

    fn is_alive(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.alive.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_mapping() {
        assert_eq!(qos_level(0), QoS::AtMostOnce);
        assert_eq!(qos_level(1), QoS::AtLeastOnce);
        assert_eq!(qos_level(2), QoS::ExactlyOnce);
    }

    #[test]
    fn test_process_client_id() {
        let id = MqttTransport::process_client_id();
        assert!(id.starts_with("input-remapper-"));
    }

    #[tokio::test]
    async fn test_fresh_transport_is_not_alive() {
        let mut transport = MqttTransport::new("test");
        assert!(!transport.is_alive());
        // Disconnecting without a session is a no-op.
        assert!(transport.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_without_session_fails() {
        let mut transport = MqttTransport::new("test");
        let err = transport
            .publish("t", 1, false, b"{}".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Publish { .. }));
    }
}

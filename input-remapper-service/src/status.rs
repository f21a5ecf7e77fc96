//! Service status samples published at `<prefix>/@/status`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zenoh::Session;

use remapper_common::{Format, encode};

use crate::error::Result;

/// Name reported in status samples.
pub const SERVICE_NAME: &str = "input-remapper";

/// Service status information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: String,
    pub version: String,
    /// "running" or "offline".
    pub status: String,
    /// Additional metadata.
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl ServiceStatus {
    pub fn running(version: impl Into<String>) -> Self {
        Self::with_state(version, "running")
    }

    pub fn offline(version: impl Into<String>) -> Self {
        Self::with_state(version, "offline")
    }

    fn with_state(version: impl Into<String>, status: &str) -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            version: version.into(),
            status: status.to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Add metadata to the status.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Publishes status samples on startup and shutdown.
pub struct StatusPublisher {
    session: Arc<Session>,
    key: String,
    version: String,
}

impl StatusPublisher {
    pub fn new(session: Arc<Session>, key: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            session,
            key: key.into(),
            version: version.into(),
        }
    }

    /// Publish "running" status with optional metadata.
    pub async fn publish_running(&self, metadata: Option<serde_json::Value>) -> Result<()> {
        let mut status = ServiceStatus::running(&self.version);
        if let Some(meta) = metadata {
            status = status.with_metadata(meta);
        }
        self.publish(&status).await
    }

    /// Publish "offline" status.
    pub async fn publish_offline(&self) -> Result<()> {
        self.publish(&ServiceStatus::offline(&self.version)).await
    }

    async fn publish(&self, status: &ServiceStatus) -> Result<()> {
        let payload = encode(status, Format::Json)?;
        self.session.put(&self.key, payload).await?;
        tracing::debug!(key = %self.key, status = %status.status, "Published status");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_running() {
        let status = ServiceStatus::running("0.1.0");
        assert_eq!(status.service, SERVICE_NAME);
        assert_eq!(status.status, "running");
    }

    #[test]
    fn test_status_serialization() {
        let status = ServiceStatus::running("1.0.0")
            .with_metadata(serde_json::json!({ "devices": ["keyboard"] }));

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"status\":\"running\""));
        assert!(json.contains("\"devices\":[\"keyboard\"]"));
    }
}

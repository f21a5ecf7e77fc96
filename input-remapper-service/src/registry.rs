//! Virtual output devices and exclusive target leases.
//!
//! A target is the name of a virtual device that remapped events are
//! injected into. Names are compared by their endpoint form (see
//! [`endpoint_name`]), so `"kbd out"` and `"kbd_out"` are the same target.
//! The [`DeviceRegistry`] hands out at most one [`InjectionTarget`] per
//! endpoint. The lease is returned when the `InjectionTarget` is dropped,
//! which happens when its worker exits, including when the worker is aborted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use remapper_common::{InputEvent, sanitize_chunk};

use crate::error::{Result, ServiceError};

/// Creates virtual outputs.
#[async_trait]
pub trait OutputBackend: Send + Sync {
    /// Whether a target of this name can be created.
    fn supports(&self, target: &str) -> bool {
        !target.trim().is_empty()
    }

    /// Create the virtual output for `target`.
    async fn create(&self, target: &str) -> Result<Box<dyn VirtualOutput>>;
}

/// A virtual device that accepts injected events.
#[async_trait]
pub trait VirtualOutput: Send {
    async fn emit(&mut self, event: &InputEvent) -> Result<()>;
}

/// Endpoint a device or target name resolves to.
///
/// Two names with the same endpoint share one capture stream or one
/// injection key, so exclusivity is checked on this form.
pub fn endpoint_name(name: &str) -> String {
    sanitize_chunk(name)
}

type Leases = Arc<Mutex<HashSet<String>>>;

/// Hands out exclusive access to virtual outputs.
#[derive(Clone)]
pub struct DeviceRegistry {
    backend: Arc<dyn OutputBackend>,
    leases: Leases,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("leases", &*self.leases.lock())
            .finish()
    }
}

impl DeviceRegistry {
    pub fn new(backend: Arc<dyn OutputBackend>) -> Self {
        Self {
            backend,
            leases: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether the backend can create `target`.
    pub fn supports(&self, target: &str) -> bool {
        self.backend.supports(target)
    }

    /// Lease `target` and create its output.
    ///
    /// Fails with [`ServiceError::TargetBusy`] while another lease on the
    /// same endpoint is alive.
    pub async fn acquire(&self, target: &str) -> Result<InjectionTarget> {
        let endpoint = endpoint_name(target);
        if !self.leases.lock().insert(endpoint.clone()) {
            return Err(ServiceError::TargetBusy(target.to_string()));
        }

        match self.backend.create(target).await {
            Ok(output) => {
                tracing::debug!(output = %target, endpoint = %endpoint, "Target leased");
                Ok(InjectionTarget {
                    name: target.to_string(),
                    endpoint,
                    output,
                    leases: self.leases.clone(),
                })
            }
            Err(e) => {
                self.leases.lock().remove(&endpoint);
                Err(e)
            }
        }
    }

    pub fn is_leased(&self, target: &str) -> bool {
        self.leases.lock().contains(&endpoint_name(target))
    }

    /// Endpoints of all leased targets, sorted.
    pub fn leased(&self) -> Vec<String> {
        let mut names: Vec<String> = self.leases.lock().iter().cloned().collect();
        names.sort();
        names
    }
}

/// Exclusive handle on a virtual output.
pub struct InjectionTarget {
    name: String,
    endpoint: String,
    output: Box<dyn VirtualOutput>,
    leases: Leases,
}

impl std::fmt::Debug for InjectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectionTarget")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl InjectionTarget {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn inject(&mut self, event: &InputEvent) -> Result<()> {
        self.output.emit(event).await
    }
}

impl Drop for InjectionTarget {
    fn drop(&mut self) {
        self.leases.lock().remove(&self.endpoint);
        tracing::debug!(output = %self.name, "Target released");
    }
}

type Emitted = Arc<Mutex<HashMap<String, Vec<InputEvent>>>>;

/// Backend that keeps injected events in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    emitted: Emitted,
    stalled: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events injected into `target` so far.
    pub fn emitted(&self, target: &str) -> Vec<InputEvent> {
        self.emitted
            .lock()
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    /// When set, `emit` never completes. Used to exercise forced stops.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }
}

#[async_trait]
impl OutputBackend for MemoryBackend {
    async fn create(&self, target: &str) -> Result<Box<dyn VirtualOutput>> {
        Ok(Box::new(MemoryOutput {
            target: target.to_string(),
            emitted: self.emitted.clone(),
            stalled: self.stalled.clone(),
        }))
    }
}

/// Output created by [`MemoryBackend`].
#[derive(Debug)]
pub struct MemoryOutput {
    target: String,
    emitted: Emitted,
    stalled: Arc<AtomicBool>,
}

#[async_trait]
impl VirtualOutput for MemoryOutput {
    async fn emit(&mut self, event: &InputEvent) -> Result<()> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.emitted
            .lock()
            .entry(self.target.clone())
            .or_default()
            .push(*event);
        Ok(())
    }
}

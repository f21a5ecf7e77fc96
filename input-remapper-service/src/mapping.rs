//! Mapping rules and the handlers built from them.
//!
//! Rules live in `mappings.json5`:
//!
//! ```json5
//! {
//!     devices: {
//!         "Logitech USB Keyboard": {
//!             target: "keyboard",
//!             mappings: [
//!                 // Caps Lock becomes Escape.
//!                 { input: { type: 1, code: 58 }, output: { type: 1, code: 1 } },
//!                 // F13 only triggers an automation.
//!                 { input: { type: 1, code: 183 }, action: "lights_toggle" },
//!             ],
//!         },
//!     },
//! }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use remapper_common::{ConfigFile, Error, EventKey, InputEvent};

use crate::error::{Result, ServiceError};
use crate::registry::{DeviceRegistry, endpoint_name};

/// Target used when a device's rules do not name one.
pub fn default_target(device: &str) -> String {
    format!("{}-remapped", device)
}

/// The whole `mappings.json5` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingRules {
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceRules>,
}

/// Rules for one input device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRules {
    /// Virtual device receiving the remapped events.
    #[serde(default)]
    pub target: Option<String>,

    #[serde(default)]
    pub mappings: Vec<Mapping>,
}

/// A single input mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub input: EventKey,

    /// Replacement input, keeping the original value.
    #[serde(default)]
    pub output: Option<EventKey>,

    /// Named action forwarded to the MQTT bridge on press.
    #[serde(default)]
    pub action: Option<String>,
}

impl ConfigFile for MappingRules {
    fn validate(&self) -> remapper_common::Result<()> {
        for (device, rules) in &self.devices {
            let mut seen = HashSet::new();
            for mapping in &rules.mappings {
                if mapping.output.is_none() && mapping.action.is_none() {
                    return Err(Error::Config(format!(
                        "device '{}': mapping for {} needs an output or an action",
                        device, mapping.input
                    )));
                }
                if mapping.action.as_deref().is_some_and(str::is_empty) {
                    return Err(Error::Config(format!(
                        "device '{}': mapping for {} has an empty action",
                        device, mapping.input
                    )));
                }
                if !seen.insert(mapping.input) {
                    return Err(Error::Config(format!(
                        "device '{}': input {} is mapped more than once",
                        device, mapping.input
                    )));
                }
            }
        }
        Ok(())
    }
}

/// What a handler chain produces for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutput {
    /// Inject this event into the device's target.
    Inject(InputEvent),
    /// Forward this action to the bridge.
    Action(String),
}

#[derive(Debug)]
struct Rule {
    output: Option<EventKey>,
    action: Option<String>,
}

/// Compiled mappings of one device. Cloning is cheap.
#[derive(Debug, Clone, Default)]
pub struct HandlerChain {
    rules: Arc<HashMap<EventKey, Rule>>,
}

impl HandlerChain {
    fn compile(mappings: &[Mapping]) -> Self {
        let rules = mappings
            .iter()
            .map(|m| {
                (
                    m.input,
                    Rule {
                        output: m.output,
                        action: m.action.clone(),
                    },
                )
            })
            .collect();
        Self {
            rules: Arc::new(rules),
        }
    }

    /// Translate one captured event.
    ///
    /// Unmapped events pass through unchanged. An action fires on press
    /// only, and a mapping without output swallows the event.
    pub fn handle(&self, event: &InputEvent) -> Vec<HandlerOutput> {
        let Some(rule) = self.rules.get(&event.key_id()) else {
            return vec![HandlerOutput::Inject(*event)];
        };

        let mut outputs = Vec::with_capacity(2);
        if let Some(key) = rule.output {
            outputs.push(HandlerOutput::Inject(event.remapped_to(key)));
        }
        if let Some(action) = &rule.action {
            if event.is_press() {
                outputs.push(HandlerOutput::Action(action.clone()));
            }
        }
        outputs
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Handler chain plus target for one device.
#[derive(Debug, Clone)]
pub struct DeviceHandlers {
    pub target: String,
    pub chain: HandlerChain,
}

/// Handlers of every configured device.
#[derive(Debug, Clone, Default)]
pub struct HandlerSet {
    devices: BTreeMap<String, DeviceHandlers>,
}

impl HandlerSet {
    /// Compile `rules`, checking every target against the registry.
    ///
    /// Two devices may not resolve to the same capture endpoint, and two
    /// targets may not resolve to the same injection endpoint.
    pub fn build(rules: &MappingRules, registry: &DeviceRegistry) -> Result<Self> {
        let mut devices = BTreeMap::new();
        let mut owners: HashMap<String, &str> = HashMap::new();
        let mut sources: HashMap<String, &str> = HashMap::new();

        for (device, device_rules) in rules.devices.iter() {
            if let Some(other) = sources.insert(endpoint_name(device), device.as_str()) {
                return Err(ServiceError::mapping(format!(
                    "devices '{}' and '{}' read the same input '{}'",
                    other,
                    device,
                    endpoint_name(device)
                )));
            }

            let target = device_rules
                .target
                .clone()
                .unwrap_or_else(|| default_target(device));

            if !registry.supports(&target) {
                return Err(ServiceError::mapping(format!(
                    "device '{}' maps to unsupported target '{}'",
                    device, target
                )));
            }
            if let Some(owner) = owners.insert(endpoint_name(&target), device.as_str()) {
                return Err(ServiceError::mapping(format!(
                    "devices '{}' and '{}' both map to target '{}'",
                    owner,
                    device,
                    endpoint_name(&target)
                )));
            }

            devices.insert(
                device.clone(),
                DeviceHandlers {
                    target,
                    chain: HandlerChain::compile(&device_rules.mappings),
                },
            );
        }

        tracing::debug!(devices = devices.len(), "Handler set built");
        Ok(Self { devices })
    }

    pub fn get(&self, device: &str) -> Option<&DeviceHandlers> {
        self.devices.get(device)
    }

    /// Configured device ids, sorted.
    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Synchronization events.
pub const EV_SYN: u16 = 0x00;
/// Key and button events.
pub const EV_KEY: u16 = 0x01;
/// Relative axis events (mouse movement, wheels).
pub const EV_REL: u16 = 0x02;
/// Absolute axis events (joysticks, triggers).
pub const EV_ABS: u16 = 0x03;

/// A single input event as captured from, or injected into, an input device.
///
/// Mirrors the kernel's `input_event` layout minus the timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputEvent {
    /// Event type (`EV_KEY`, `EV_REL`, ...).
    #[serde(rename = "type")]
    pub event_type: u16,

    /// Event code within the type (e.g. `KEY_A` = 30).
    pub code: u16,

    /// Event value: 1 = press, 0 = release, 2 = autorepeat for keys.
    pub value: i32,
}

impl InputEvent {
    /// Create a new input event.
    pub fn new(event_type: u16, code: u16, value: i32) -> Self {
        Self {
            event_type,
            code,
            value,
        }
    }

    /// Create a key event.
    pub fn key(code: u16, value: i32) -> Self {
        Self::new(EV_KEY, code, value)
    }

    /// The type/code pair identifying this event's input.
    pub fn key_id(&self) -> EventKey {
        EventKey {
            event_type: self.event_type,
            code: self.code,
        }
    }

    /// Whether this is a key press (not release, not autorepeat).
    pub fn is_press(&self) -> bool {
        self.event_type == EV_KEY && self.value == 1
    }

    /// Return a copy with the type and code replaced, keeping the value.
    pub fn remapped_to(&self, key: EventKey) -> Self {
        Self {
            event_type: key.event_type,
            code: key.code,
            value: self.value,
        }
    }
}

/// Identifies an input independent of its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    #[serde(rename = "type")]
    pub event_type: u16,
    pub code: u16,
}

impl EventKey {
    /// Create a new event key.
    pub fn new(event_type: u16, code: u16) -> Self {
        Self { event_type, code }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.event_type, self.code)
    }
}

/// Get the current Unix timestamp in milliseconds.
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_uses_type_field() {
        let event = InputEvent::key(30, 1);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":1,"code":30,"value":1}"#);
    }

    #[test]
    fn test_is_press() {
        assert!(InputEvent::key(30, 1).is_press());
        assert!(!InputEvent::key(30, 0).is_press());
        assert!(!InputEvent::key(30, 2).is_press());
        assert!(!InputEvent::new(EV_REL, 0, 1).is_press());
    }

    #[test]
    fn test_remapped_keeps_value() {
        let event = InputEvent::key(30, 2);
        let remapped = event.remapped_to(EventKey::new(EV_KEY, 48));
        assert_eq!(remapped, InputEvent::key(48, 2));
        assert_eq!(event.key_id(), EventKey::new(EV_KEY, 30));
    }

    #[test]
    fn test_event_key_display() {
        assert_eq!(EventKey::new(EV_ABS, 5).to_string(), "3:5");
    }

    #[test]
    fn test_timestamp_is_positive() {
        assert!(current_timestamp_millis() > 0);
    }
}

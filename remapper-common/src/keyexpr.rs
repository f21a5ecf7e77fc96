use crate::error::{Error, Result};

/// Default key expression prefix for the service.
pub const KEY_PREFIX: &str = "input-remapper";

/// Characters that are not allowed inside a single key expression chunk.
const RESERVED: &[char] = &['/', '*', '$', '?', '#'];

/// Replace characters that cannot appear in a key chunk.
///
/// Device names such as `"Logitech USB Keyboard"` contain spaces, and some
/// contain slashes. Both become `_`.
///
/// # Example
/// ```
/// use remapper_common::keyexpr::sanitize_chunk;
///
/// assert_eq!(sanitize_chunk("Logitech USB Keyboard"), "Logitech_USB_Keyboard");
/// assert_eq!(sanitize_chunk("usb/1-2"), "usb_1-2");
/// ```
pub fn sanitize_chunk(chunk: &str) -> String {
    chunk
        .chars()
        .map(|c| {
            if c.is_whitespace() || RESERVED.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Builder for the service's key expressions.
///
/// Administrative keys live below `<prefix>/@/`. Event traffic uses
/// `<prefix>/devices/<device>/capture` for raw input and
/// `<prefix>/targets/<target>/inject` for remapped output.
#[derive(Debug, Clone)]
pub struct KeyExprBuilder {
    prefix: String,
}

impl Default for KeyExprBuilder {
    fn default() -> Self {
        Self {
            prefix: KEY_PREFIX.to_string(),
        }
    }
}

impl KeyExprBuilder {
    /// Create a builder with a custom prefix.
    ///
    /// The prefix may contain `/` separators but no wildcards and no empty chunks.
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() || prefix.starts_with('/') || prefix.ends_with('/') {
            return Err(Error::key_expr(format!(
                "prefix '{}' must be non-empty and must not start or end with '/'",
                prefix
            )));
        }
        if prefix.split('/').any(|chunk| {
            chunk.is_empty() || chunk.contains(['*', '$', '?', '#']) || chunk == "@"
        }) {
            return Err(Error::key_expr(format!(
                "prefix '{}' contains an empty, wildcard or reserved chunk",
                prefix
            )));
        }
        Ok(Self { prefix })
    }

    /// The configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of the control queryable.
    ///
    /// # Example
    /// ```
    /// use remapper_common::keyexpr::KeyExprBuilder;
    ///
    /// assert_eq!(KeyExprBuilder::default().control_key(), "input-remapper/@/control");
    /// ```
    pub fn control_key(&self) -> String {
        format!("{}/@/control", self.prefix)
    }

    /// Key of the service liveliness token.
    pub fn alive_key(&self) -> String {
        format!("{}/@/alive", self.prefix)
    }

    /// Key for service status messages.
    pub fn status_key(&self) -> String {
        format!("{}/@/status", self.prefix)
    }

    /// Key on which raw events for a device are captured.
    ///
    /// # Example
    /// ```
    /// use remapper_common::keyexpr::KeyExprBuilder;
    ///
    /// let keys = KeyExprBuilder::default();
    /// assert_eq!(
    ///     keys.capture_key("Logitech USB Keyboard"),
    ///     "input-remapper/devices/Logitech_USB_Keyboard/capture"
    /// );
    /// ```
    pub fn capture_key(&self, device: &str) -> String {
        format!("{}/devices/{}/capture", self.prefix, sanitize_chunk(device))
    }

    /// Key on which remapped events for a virtual target are injected.
    pub fn inject_key(&self, target: &str) -> String {
        format!("{}/targets/{}/inject", self.prefix, sanitize_chunk(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_keys() {
        let keys = KeyExprBuilder::new("home/remapper").unwrap();
        assert_eq!(keys.prefix(), "home/remapper");
        assert_eq!(keys.control_key(), "home/remapper/@/control");
        assert_eq!(keys.alive_key(), "home/remapper/@/alive");
        assert_eq!(keys.status_key(), "home/remapper/@/status");
    }

    #[test]
    fn test_event_keys_are_sanitized() {
        let keys = KeyExprBuilder::default();
        assert_eq!(
            keys.inject_key("keyboard forwarded"),
            "input-remapper/targets/keyboard_forwarded/inject"
        );
        assert_eq!(
            keys.capture_key("pad*#1"),
            "input-remapper/devices/pad__1/capture"
        );
    }

    #[test]
    fn test_invalid_prefixes() {
        for prefix in ["", "/abs", "trailing/", "a//b", "wild/*", "admin/@"] {
            assert!(
                matches!(KeyExprBuilder::new(prefix), Err(Error::KeyExpr(_))),
                "prefix {:?} should be rejected",
                prefix
            );
        }
    }
}

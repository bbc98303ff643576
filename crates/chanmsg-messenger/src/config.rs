use std::time::Duration;

use chanmsg_envelope::DEFAULT_MAX_PAYLOAD;
use serde::{Deserialize, Serialize};

/// Endpoint behavior configuration.
///
/// Deserializes from the same option names a host page would pass, with the
/// timeout expressed in milliseconds:
/// ```json
/// { "timeout": 5000, "ack": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessengerConfig {
    /// How long to wait for an acknowledgment before failing the send.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Whether sent messages require acknowledgment and received messages
    /// are acknowledged.
    pub ack: bool,
    /// Maximum encoded size of an inbound envelope.
    pub max_payload_size: usize,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            ack: false,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl MessengerConfig {
    /// Parse a JSON options object; absent keys keep their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Enable or disable acknowledgments.
    pub fn with_ack(mut self, ack: bool) -> Self {
        self.ack = ack;
        self
    }

    /// Override the acknowledgment timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the inbound envelope size ceiling.
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MessengerConfig::default();
        assert_eq!(config.timeout, Duration::from_millis(5000));
        assert!(!config.ack);
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = MessengerConfig::from_json(r#"{ "ack": true }"#).unwrap();
        assert!(config.ack);
        assert_eq!(config.timeout, Duration::from_millis(5000));
    }

    #[test]
    fn timeout_is_milliseconds() {
        let config = MessengerConfig::from_json(r#"{ "timeout": 100, "ack": true }"#).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(100));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["timeout"], 100);
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(MessengerConfig::from_json(r#"{ "timeout": "soon" }"#).is_err());
    }

    #[test]
    fn builder_overrides() {
        let config = MessengerConfig::default()
            .with_ack(true)
            .with_timeout(Duration::from_millis(250))
            .with_max_payload_size(1024);
        assert!(config.ack);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.max_payload_size, 1024);
    }
}

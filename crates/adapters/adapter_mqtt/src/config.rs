//! MQTT publisher configuration.

use serde::Deserialize;

/// Configuration for the MQTT publisher.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// Optional username for broker authentication.
    pub username: Option<String>,
    /// Optional password for broker authentication.
    pub password: Option<String>,
    /// MQTT client identifier.
    pub client_id: String,
    /// Keep-alive interval in seconds.
    pub keepalive: u16,
    /// QoS level for state and discovery publishes (0, 1, or 2).
    pub qos: u8,
    /// Retain flag on state and discovery topics.
    pub retain: bool,
    /// Enable TLS on the broker connection.
    pub tls: bool,
    /// Prefix of the per-device state topics.
    pub base_topic: String,
    /// Home Assistant discovery topic prefix.
    pub discovery_prefix: String,
    /// Periodic heartbeat interval in seconds.
    pub publish_interval: u64,
    /// Include per-field statistics in state payloads and announce the
    /// auxiliary statistics sensors.
    pub statistics: bool,
    /// Publish empty discovery payloads on shutdown to remove the entities
    /// from Home Assistant. Off by default to avoid churn on restarts.
    pub discovery_cleanup: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            username: None,
            password: None,
            client_id: "mijiableht-daemon".to_string(),
            keepalive: 60,
            qos: 1,
            retain: true,
            tls: false,
            base_topic: "mijiableht".to_string(),
            discovery_prefix: "homeassistant".to_string(),
            publish_interval: 300,
            statistics: true,
            discovery_cleanup: false,
        }
    }
}

impl MqttConfig {
    /// Availability topic carrying retained `online` / `offline` markers.
    #[must_use]
    pub fn status_topic(&self) -> String {
        format!("{}/status", self.base_topic)
    }

    /// State topic for one device.
    #[must_use]
    pub fn state_topic(&self, device_id: &str) -> String {
        format!("{}/{device_id}/state", self.base_topic)
    }

    /// Discovery config topic for one sensor of one device.
    #[must_use]
    pub fn discovery_topic(&self, device_id: &str, sensor: &str) -> String {
        format!(
            "{}/sensor/mijiableht_{device_id}_{sensor}/config",
            self.discovery_prefix
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_have_sensible_defaults() {
        let config = MqttConfig::default();
        assert_eq!(config.broker_host, "localhost");
        assert_eq!(config.broker_port, 1883);
        assert_eq!(config.client_id, "mijiableht-daemon");
        assert_eq!(config.keepalive, 60);
        assert_eq!(config.qos, 1);
        assert!(config.retain);
        assert!(!config.tls);
        assert_eq!(config.base_topic, "mijiableht");
        assert_eq!(config.discovery_prefix, "homeassistant");
        assert_eq!(config.publish_interval, 300);
        assert!(config.statistics);
        assert!(!config.discovery_cleanup);
    }

    #[test]
    fn should_format_state_topic() {
        let config = MqttConfig::default();
        assert_eq!(
            config.state_topic("4C65A8DB9944"),
            "mijiableht/4C65A8DB9944/state"
        );
    }

    #[test]
    fn should_format_discovery_topic() {
        let config = MqttConfig::default();
        assert_eq!(
            config.discovery_topic("4C65A8DB9944", "temperature"),
            "homeassistant/sensor/mijiableht_4C65A8DB9944_temperature/config"
        );
    }

    #[test]
    fn should_format_status_topic() {
        let config = MqttConfig::default();
        assert_eq!(config.status_topic(), "mijiableht/status");
    }
}

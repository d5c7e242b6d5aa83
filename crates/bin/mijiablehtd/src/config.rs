//! Configuration loading — YAML file with environment variable overrides.
//!
//! Looks for `mijiableht.yaml` in the working directory (path overridable
//! via `MIJIA_CONFIG`). Every field has a sensible default so the file is
//! optional. `MIJIA_*` environment variables take precedence over file
//! values, and a `/run/secrets/mqtt_password` docker secret takes
//! precedence over both for the broker password.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use chrono_tz::Tz;
use serde::Deserialize;

use mijiableht_adapter_ble::BleConfig;
use mijiableht_adapter_mqtt::MqttConfig;
use mijiableht_app::cache::CacheConfig;
use mijiableht_domain::mac::MacAddress;

/// Default config file path, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "mijiableht.yaml";
/// Docker secret overriding the MQTT password when mounted.
const MQTT_PASSWORD_SECRET: &str = "/run/secrets/mqtt_password";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// BLE scanner settings.
    pub bluetooth: BleConfig,
    /// MQTT broker and publishing settings.
    pub mqtt: MqttConfig,
    /// Publish thresholds.
    pub thresholds: ThresholdsConfig,
    /// Statically known devices.
    pub devices: DevicesConfig,
    /// IANA timezone used to format `last_seen` (e.g. `Europe/Prague`).
    /// UTC when unset.
    pub timezone: Option<String>,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Value deltas that trigger an immediate publish.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    /// ΔT in °C.
    pub temperature: f64,
    /// ΔH in % RH.
    pub humidity: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            humidity: 1.0,
        }
    }
}

/// Statically configured devices.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub static_devices: Vec<StaticDevice>,
}

/// One statically known device: its MAC and an optional display name.
#[derive(Debug, Deserialize)]
pub struct StaticDevice {
    pub mac: MacAddress,
    #[serde(alias = "name")]
    pub friendly_name: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "mijiablehtd=info,mijiableht=info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the YAML file (if present), then apply
    /// docker secrets and environment-variable overrides, then validate.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file exists but is malformed, or
    /// when the merged configuration fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("MIJIA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_secret_file(Path::new(MQTT_PASSWORD_SECRET));
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_yaml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_secret_file(&mut self, path: &Path) {
        if let Ok(secret) = std::fs::read_to_string(path) {
            let secret = secret.trim();
            if !secret.is_empty() {
                self.mqtt.password = Some(secret.to_string());
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MIJIA_MQTT_BROKER_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Ok(val) = std::env::var("MIJIA_MQTT_BROKER_PORT") {
            if let Ok(port) = val.parse() {
                self.mqtt.broker_port = port;
            }
        }
        if let Ok(val) = std::env::var("MIJIA_MQTT_USERNAME") {
            self.mqtt.username = Some(val);
        }
        if let Ok(val) = std::env::var("MIJIA_MQTT_PASSWORD") {
            self.mqtt.password = Some(val);
        }
        if let Ok(val) = std::env::var("MIJIA_MQTT_CLIENT_ID") {
            self.mqtt.client_id = val;
        }
        if let Ok(val) = std::env::var("MIJIA_MQTT_QOS") {
            if let Ok(qos) = val.parse() {
                self.mqtt.qos = qos;
            }
        }
        if let Ok(val) = std::env::var("MIJIA_MQTT_RETAIN") {
            self.mqtt.retain = parse_bool(&val).unwrap_or(self.mqtt.retain);
        }
        if let Ok(val) = std::env::var("MIJIA_MQTT_BASE_TOPIC") {
            self.mqtt.base_topic = val;
        }
        if let Ok(val) = std::env::var("MIJIA_MQTT_DISCOVERY_PREFIX") {
            self.mqtt.discovery_prefix = val;
        }
        if let Ok(val) = std::env::var("MIJIA_MQTT_PUBLISH_INTERVAL") {
            if let Ok(interval) = val.parse() {
                self.mqtt.publish_interval = interval;
            }
        }
        if let Ok(val) = std::env::var("MIJIA_BLUETOOTH_ADAPTER") {
            if let Ok(adapter) = val.parse() {
                self.bluetooth.adapter = adapter;
            }
        }
        if let Ok(val) = std::env::var("MIJIA_THRESHOLD_TEMPERATURE") {
            if let Ok(delta) = val.parse() {
                self.thresholds.temperature = delta;
            }
        }
        if let Ok(val) = std::env::var("MIJIA_THRESHOLD_HUMIDITY") {
            if let Ok(delta) = val.parse() {
                self.thresholds.humidity = delta;
            }
        }
        if let Ok(val) = std::env::var("MIJIA_TIMEZONE") {
            self.timezone = Some(val);
        }
        if let Ok(val) = std::env::var("MIJIA_LOG_LEVEL") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.broker_host.is_empty() {
            return Err(ConfigError::Validation(
                "mqtt.broker_host must not be empty".to_string(),
            ));
        }
        if self.mqtt.qos > 2 {
            return Err(ConfigError::Validation(format!(
                "mqtt.qos must be 0, 1, or 2, got {}",
                self.mqtt.qos
            )));
        }
        if self.mqtt.publish_interval == 0 {
            return Err(ConfigError::Validation(
                "mqtt.publish_interval must be positive".to_string(),
            ));
        }
        if self.thresholds.temperature <= 0.0 {
            return Err(ConfigError::Validation(
                "thresholds.temperature must be positive".to_string(),
            ));
        }
        if self.thresholds.humidity <= 0.0 {
            return Err(ConfigError::Validation(
                "thresholds.humidity must be positive".to_string(),
            ));
        }
        if self.bluetooth.channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "bluetooth.channel_capacity must be positive".to_string(),
            ));
        }
        self.timezone()?;
        Ok(())
    }

    /// Resolve the configured timezone, defaulting to UTC.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for unknown IANA names.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        match &self.timezone {
            None => Ok(chrono_tz::UTC),
            Some(name) => Tz::from_str(name).map_err(|_| {
                ConfigError::Validation(format!("unknown IANA timezone: {name}"))
            }),
        }
    }

    /// Cache policy derived from the thresholds and publish interval.
    #[must_use]
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            temperature_threshold: self.thresholds.temperature,
            humidity_threshold: self.thresholds.humidity,
            publish_interval: std::time::Duration::from_secs(self.mqtt.publish_interval),
        }
    }

    /// Friendly-name index from the static device list.
    #[must_use]
    pub fn friendly_names(&self) -> HashMap<MacAddress, String> {
        self.devices
            .static_devices
            .iter()
            .filter_map(|device| {
                device
                    .friendly_name
                    .clone()
                    .map(|name| (device.mac, name))
            })
            .collect()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// YAML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] serde_yaml::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.bluetooth.adapter, 0);
        assert_eq!(config.mqtt.broker_host, "localhost");
        assert_eq!(config.mqtt.base_topic, "mijiableht");
        assert_eq!(config.thresholds.temperature, 0.2);
        assert_eq!(config.thresholds.humidity, 1.0);
        assert!(config.timezone.is_none());
        assert!(config.devices.static_devices.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_minimal_yaml() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.mqtt.broker_port, 1883);
    }

    #[test]
    fn should_parse_full_yaml() {
        let yaml = "
            bluetooth:
              adapter: 1
            mqtt:
              broker_host: broker.lan
              broker_port: 8883
              username: mijia
              password: hunter2
              client_id: mijia-attic
              tls: true
              qos: 2
              retain: false
              base_topic: sensors
              discovery_prefix: ha
              publish_interval: 120
              statistics: false
              discovery_cleanup: true
            thresholds:
              temperature: 0.5
              humidity: 2.0
            devices:
              static_devices:
                - mac: '4C:65:A8:DC:84:01'
                  friendly_name: Living Room
                - mac: '4C:65:A8:DB:99:44'
            timezone: Europe/Prague
            logging:
              filter: debug
        ";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.bluetooth.adapter, 1);
        assert_eq!(config.mqtt.broker_host, "broker.lan");
        assert_eq!(config.mqtt.broker_port, 8883);
        assert_eq!(config.mqtt.username.as_deref(), Some("mijia"));
        assert_eq!(config.mqtt.qos, 2);
        assert!(config.mqtt.tls);
        assert!(!config.mqtt.retain);
        assert!(!config.mqtt.statistics);
        assert!(config.mqtt.discovery_cleanup);
        assert_eq!(config.thresholds.temperature, 0.5);
        assert_eq!(config.devices.static_devices.len(), 2);
        assert_eq!(
            config.devices.static_devices[0].friendly_name.as_deref(),
            Some("Living Room")
        );
        assert_eq!(config.timezone.as_deref(), Some("Europe/Prague"));
        assert_eq!(config.logging.filter, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_accept_name_alias_for_friendly_name() {
        let yaml = "
            devices:
              static_devices:
                - mac: '4C:65:A8:DC:84:01'
                  name: Bedroom
        ";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.devices.static_devices[0].friendly_name.as_deref(),
            Some("Bedroom")
        );
    }

    #[test]
    fn should_build_friendly_name_index() {
        let yaml = "
            devices:
              static_devices:
                - mac: '4C:65:A8:DC:84:01'
                  friendly_name: Living Room
                - mac: '4C:65:A8:DB:99:44'
        ";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let names = config.friendly_names();
        assert_eq!(names.len(), 1);
        assert_eq!(
            names[&MacAddress::parse("4C:65:A8:DC:84:01").unwrap()],
            "Living Room"
        );
    }

    #[test]
    fn should_reject_invalid_mac_in_static_devices() {
        let yaml = "
            devices:
              static_devices:
                - mac: 'not-a-mac'
        ";
        let result: Result<Config, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.yaml").unwrap();
        assert_eq!(config.mqtt.broker_port, 1883);
    }

    #[test]
    fn should_reject_invalid_qos() {
        let mut config = Config::default();
        config.mqtt.qos = 3;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn should_reject_zero_publish_interval() {
        let mut config = Config::default();
        config.mqtt.publish_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_non_positive_thresholds() {
        let mut config = Config::default();
        config.thresholds.temperature = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.thresholds.humidity = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_unknown_timezone() {
        let mut config = Config::default();
        config.timezone = Some("Mars/Olympus_Mons".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_resolve_timezone_defaulting_to_utc() {
        let config = Config::default();
        assert_eq!(config.timezone().unwrap(), chrono_tz::UTC);

        let mut config = Config::default();
        config.timezone = Some("Europe/Prague".to_string());
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Prague);
    }

    #[test]
    fn should_derive_cache_config() {
        let mut config = Config::default();
        config.thresholds.temperature = 0.5;
        config.mqtt.publish_interval = 120;
        let cache = config.cache_config();
        assert_eq!(cache.temperature_threshold, 0.5);
        assert_eq!(cache.humidity_threshold, 1.0);
        assert_eq!(cache.publish_interval.as_secs(), 120);
    }

    #[test]
    fn should_override_from_environment() {
        std::env::set_var("MIJIA_MQTT_BROKER_HOST", "broker.example");
        std::env::set_var("MIJIA_MQTT_BROKER_PORT", "8883");
        std::env::set_var("MIJIA_MQTT_RETAIN", "no");
        std::env::set_var("MIJIA_THRESHOLD_TEMPERATURE", "0.7");
        std::env::set_var("MIJIA_TIMEZONE", "Europe/Prague");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.mqtt.broker_host, "broker.example");
        assert_eq!(config.mqtt.broker_port, 8883);
        assert!(!config.mqtt.retain);
        assert_eq!(config.thresholds.temperature, 0.7);
        assert_eq!(config.timezone.as_deref(), Some("Europe/Prague"));

        std::env::remove_var("MIJIA_MQTT_BROKER_HOST");
        std::env::remove_var("MIJIA_MQTT_BROKER_PORT");
        std::env::remove_var("MIJIA_MQTT_RETAIN");
        std::env::remove_var("MIJIA_THRESHOLD_TEMPERATURE");
        std::env::remove_var("MIJIA_TIMEZONE");
    }

    #[test]
    fn should_apply_password_secret_file() {
        let dir = std::env::temp_dir().join("mijiableht-secret-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("mqtt_password");
        std::fs::write(&path, "s3cret\n").unwrap();

        let mut config = Config::default();
        config.apply_secret_file(&path);
        assert_eq!(config.mqtt.password.as_deref(), Some("s3cret"));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn should_ignore_missing_secret_file() {
        let mut config = Config::default();
        config.apply_secret_file(Path::new("/nonexistent/mqtt_password"));
        assert!(config.mqtt.password.is_none());
    }

    #[test]
    fn should_parse_bool_variants() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}

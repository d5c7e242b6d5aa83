//! Home Assistant MQTT discovery rendering.
//!
//! Each device announces three primary sensors (temperature, humidity,
//! battery) and, when statistics are enabled, the auxiliary
//! `{field}_{min,max,avg,count}` sensors. Payloads are retained on
//! well-known config topics so Home Assistant picks the entities up
//! whenever it (re)starts.

use std::hash::{DefaultHasher, Hash, Hasher};

use serde_json::{json, Value};

use mijiableht_domain::mac::MacAddress;
use mijiableht_domain::model::DeviceModel;

use crate::config::MqttConfig;

/// Entities expire when no state arrives for 15 minutes.
const EXPIRE_AFTER_SECS: u32 = 900;

/// One rendered discovery config.
#[derive(Debug, Clone)]
pub struct DiscoveryMessage {
    pub topic: String,
    pub payload: Value,
}

/// A sensor entry in the discovery table.
struct SensorSpec {
    /// Field name in the state JSON, also the topic suffix.
    field: String,
    /// Human-readable suffix for the entity name.
    label: String,
    device_class: Option<&'static str>,
    unit: Option<&'static str>,
    icon: Option<&'static str>,
}

impl SensorSpec {
    fn primary(
        field: &str,
        label: &str,
        device_class: &'static str,
        unit: &'static str,
        icon: &'static str,
    ) -> Self {
        Self {
            field: field.to_string(),
            label: label.to_string(),
            device_class: Some(device_class),
            unit: Some(unit),
            icon: Some(icon),
        }
    }
}

fn primary_sensors() -> Vec<SensorSpec> {
    vec![
        SensorSpec::primary(
            "temperature",
            "Temperature",
            "temperature",
            "°C",
            "mdi:thermometer",
        ),
        SensorSpec::primary("humidity", "Humidity", "humidity", "%", "mdi:water-percent"),
        SensorSpec::primary("battery", "Battery", "battery", "%", "mdi:battery"),
    ]
}

/// Auxiliary statistics sensors: no device class, unit only where the base
/// field's unit applies.
fn statistics_sensors() -> Vec<SensorSpec> {
    let mut sensors = Vec::new();
    for (base, label, unit) in [
        ("temperature", "Temperature", Some("°C")),
        ("humidity", "Humidity", Some("%")),
    ] {
        for (suffix, suffix_label) in [("min", "Min"), ("max", "Max"), ("avg", "Average")] {
            sensors.push(SensorSpec {
                field: format!("{base}_{suffix}"),
                label: format!("{label} {suffix_label}"),
                device_class: None,
                unit,
                icon: None,
            });
        }
        sensors.push(SensorSpec {
            field: format!("{base}_count"),
            label: format!("{label} Samples"),
            device_class: None,
            unit: None,
            icon: None,
        });
    }
    sensors
}

/// Render all discovery configs for one device.
#[must_use]
pub fn discovery_messages(
    config: &MqttConfig,
    mac: MacAddress,
    friendly_name: Option<&str>,
    model: DeviceModel,
) -> Vec<DiscoveryMessage> {
    let device_id = mac.device_id();
    let state_topic = config.state_topic(&device_id);
    let availability_topic = config.status_topic();

    let device_name = friendly_name.map_or_else(
        || format!("Mijia Thermometer {}", &device_id[device_id.len() - 4..]),
        ToOwned::to_owned,
    );
    let device = json!({
        "identifiers": [mac.to_string()],
        "manufacturer": "Xiaomi",
        "model": model.ha_model(),
        "name": device_name,
    });

    let mut sensors = primary_sensors();
    if config.statistics {
        sensors.extend(statistics_sensors());
    }

    sensors
        .into_iter()
        .map(|sensor| {
            let mut payload = json!({
                "name": format!("{device_name} {}", sensor.label),
                "unique_id": format!("mijiableht_{device_id}_{}", sensor.field),
                "state_topic": state_topic,
                "value_template": format!("{{{{ value_json.{} }}}}", sensor.field),
                "availability_topic": availability_topic,
                "expire_after": EXPIRE_AFTER_SECS,
                "device": device,
            });
            if let Some(class) = sensor.device_class {
                payload["device_class"] = json!(class);
            }
            if let Some(unit) = sensor.unit {
                payload["unit_of_measurement"] = json!(unit);
            }
            if let Some(icon) = sensor.icon {
                payload["icon"] = json!(icon);
            }
            DiscoveryMessage {
                topic: config.discovery_topic(&device_id, &sensor.field),
                payload,
            }
        })
        .collect()
}

/// Hash the rendered configs, to detect when a device's discovery needs to
/// be re-published (e.g. its friendly name arrived).
#[must_use]
pub fn config_hash(messages: &[DiscoveryMessage]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for message in messages {
        message.topic.hash(&mut hasher);
        message.payload.to_string().hash(&mut hasher);
    }
    hasher.finish()
}

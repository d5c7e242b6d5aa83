//! State payload encoding.
//!
//! One publish is a single JSON object carrying the assembled reading, the
//! timezone-aware `last_seen` instant, the signal label, and (when enabled)
//! the per-field statistics accumulated since the previous publish.

use chrono::SecondsFormat;
use chrono_tz::Tz;
use serde_json::{json, Map, Value};

use mijiableht_domain::reading::CompleteReading;
use mijiableht_domain::stats::ValueStatistics;

/// How min/max of a statistics block are rendered.
enum StatValues {
    /// Raw readings with 0.1 resolution (temperature, humidity).
    Float,
    /// Integral readings (battery percent, RSSI dBm).
    Integer,
}

/// Render the state payload for one reading.
#[must_use]
pub fn state_payload(reading: &CompleteReading, timezone: Tz, statistics: bool) -> Value {
    let mut payload = Map::new();
    payload.insert("temperature".to_string(), json!(reading.temperature));
    payload.insert("humidity".to_string(), json!(reading.humidity));
    payload.insert("battery".to_string(), json!(reading.battery));
    if let Some(voltage_mv) = reading.voltage_mv {
        payload.insert(
            "voltage".to_string(),
            json!(f64::from(voltage_mv) / 1000.0),
        );
    }
    payload.insert(
        "last_seen".to_string(),
        json!(reading
            .last_seen
            .with_timezone(&timezone)
            .to_rfc3339_opts(SecondsFormat::Millis, false)),
    );
    if let Some(rssi) = reading.rssi {
        payload.insert("rssi".to_string(), json!(rssi));
    }
    payload.insert("signal".to_string(), json!(reading.signal));
    payload.insert("message_type".to_string(), json!(reading.message_type));
    if let Some(name) = &reading.friendly_name {
        payload.insert("friendly_name".to_string(), json!(name));
    }

    if statistics {
        let stats = &reading.statistics;
        insert_stats(&mut payload, "temperature", &stats.temperature, &StatValues::Float);
        insert_stats(&mut payload, "humidity", &stats.humidity, &StatValues::Float);
        insert_stats(&mut payload, "battery", &stats.battery, &StatValues::Integer);
        insert_stats(&mut payload, "rssi", &stats.rssi, &StatValues::Integer);
    }

    Value::Object(payload)
}

/// Insert the `{field}_{count,min,max,avg}` block. The count is always
/// present; min/max/avg are omitted while no sample has been recorded.
fn insert_stats(payload: &mut Map<String, Value>, field: &str, stats: &ValueStatistics, values: &StatValues) {
    payload.insert(format!("{field}_count"), json!(stats.count()));
    let (Some(min), Some(max), Some(avg)) = (stats.min(), stats.max(), stats.avg()) else {
        return;
    };
    match values {
        StatValues::Float => {
            payload.insert(format!("{field}_min"), json!(min));
            payload.insert(format!("{field}_max"), json!(max));
        }
        StatValues::Integer => {
            payload.insert(format!("{field}_min"), json!(min as i64));
            payload.insert(format!("{field}_max"), json!(max as i64));
        }
    }
    payload.insert(format!("{field}_avg"), json!(round2(avg)));
}

/// Round to two decimals for the published averages.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};
    use mijiableht_domain::mac::MacAddress;
    use mijiableht_domain::model::DeviceModel;
    use mijiableht_domain::reading::MessageType;
    use mijiableht_domain::signal::SignalQuality;
    use mijiableht_domain::stats::DeviceStatistics;

    fn reading() -> CompleteReading {
        let mut statistics = DeviceStatistics::default();
        statistics.temperature.record(23.2);
        statistics.temperature.record(23.7);
        statistics.humidity.record(44.8);
        statistics.humidity.record(45.6);
        statistics.battery.record(78.0);
        statistics.rssi.record(-72.0);
        statistics.rssi.record(-68.0);

        CompleteReading {
            mac: MacAddress::parse("4C:65:A8:DB:99:44").unwrap(),
            friendly_name: Some("Living Room".to_string()),
            model: DeviceModel::Lywsdcgq,
            temperature: 23.5,
            humidity: 45.2,
            battery: 78,
            voltage_mv: Some(2980),
            rssi: Some(-70),
            signal: SignalQuality::Fair,
            last_seen: Utc.with_ymd_and_hms(2025, 10, 2, 8, 3, 3).unwrap()
                + TimeDelta::milliseconds(816),
            message_type: MessageType::ThresholdBased,
            statistics,
        }
    }

    #[test]
    fn should_render_all_core_fields() {
        let payload = state_payload(&reading(), chrono_tz::UTC, false);
        assert_eq!(payload["temperature"], json!(23.5));
        assert_eq!(payload["humidity"], json!(45.2));
        assert_eq!(payload["battery"], json!(78));
        assert_eq!(payload["voltage"], json!(2.98));
        assert_eq!(payload["rssi"], json!(-70));
        assert_eq!(payload["signal"], json!("fair"));
        assert_eq!(payload["message_type"], json!("threshold-based"));
        assert_eq!(payload["friendly_name"], json!("Living Room"));
    }

    #[test]
    fn should_format_last_seen_in_configured_zone() {
        let payload = state_payload(&reading(), chrono_tz::Europe::Prague, false);
        assert_eq!(
            payload["last_seen"],
            json!("2025-10-02T10:03:03.816+02:00")
        );
    }

    #[test]
    fn should_include_statistics_block_when_enabled() {
        let payload = state_payload(&reading(), chrono_tz::UTC, true);
        assert_eq!(payload["temperature_count"], json!(2));
        assert_eq!(payload["temperature_min"], json!(23.2));
        assert_eq!(payload["temperature_max"], json!(23.7));
        assert_eq!(payload["temperature_avg"], json!(23.45));
        assert_eq!(payload["humidity_count"], json!(2));
        assert_eq!(payload["humidity_avg"], json!(45.2));
        assert_eq!(payload["battery_count"], json!(1));
        assert_eq!(payload["battery_min"], json!(78));
        assert_eq!(payload["battery_avg"], json!(78.0));
        assert_eq!(payload["rssi_count"], json!(2));
        assert_eq!(payload["rssi_min"], json!(-72));
        assert_eq!(payload["rssi_max"], json!(-68));
        assert_eq!(payload["rssi_avg"], json!(-70.0));
    }

    #[test]
    fn should_omit_statistics_block_when_disabled() {
        let payload = state_payload(&reading(), chrono_tz::UTC, false);
        assert!(payload.get("temperature_count").is_none());
        assert!(payload.get("rssi_avg").is_none());
    }

    #[test]
    fn should_keep_counts_but_omit_min_max_avg_for_empty_fields() {
        let mut reading = reading();
        reading.statistics = DeviceStatistics::default();
        reading.statistics.rssi.record(-70.0);

        let payload = state_payload(&reading, chrono_tz::UTC, true);
        assert_eq!(payload["temperature_count"], json!(0));
        assert!(payload.get("temperature_min").is_none());
        assert!(payload.get("temperature_avg").is_none());
        assert_eq!(payload["rssi_count"], json!(1));
        assert_eq!(payload["rssi_min"], json!(-70));
    }

    #[test]
    fn should_omit_optional_fields_when_absent() {
        let mut reading = reading();
        reading.voltage_mv = None;
        reading.rssi = None;
        reading.friendly_name = None;
        reading.signal = SignalQuality::Unknown;

        let payload = state_payload(&reading, chrono_tz::UTC, false);
        assert!(payload.get("voltage").is_none());
        assert!(payload.get("rssi").is_none());
        assert!(payload.get("friendly_name").is_none());
        assert_eq!(payload["signal"], json!("unknown"));
    }

    #[test]
    fn should_re_parse_to_the_same_content() {
        let payload = state_payload(&reading(), chrono_tz::Europe::Prague, true);
        let text = serde_json::to_string(&payload).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, payload);
    }
}

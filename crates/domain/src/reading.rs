//! Sensor readings — partial readings decoded from single advertisements and
//! the complete readings the cache assembles from them.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::ValidationError;
use crate::mac::MacAddress;
use crate::model::DeviceModel;
use crate::signal::SignalQuality;
use crate::stats::DeviceStatistics;
use crate::time::Timestamp;

/// Lowest plausible sensor temperature in °C.
pub const TEMPERATURE_MIN: f64 = -40.0;
/// Highest plausible sensor temperature in °C.
pub const TEMPERATURE_MAX: f64 = 85.0;

/// A reading covering a subset of the sensor's fields.
///
/// One MiBeacon advertisement typically carries a single TLV, so a partial
/// reading usually holds exactly one field; the combined temperature +
/// humidity TLV yields both. Partials are consumed by the cache immediately
/// and never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialReading {
    pub mac: MacAddress,
    pub received_at: Timestamp,
    /// Temperature in °C, 0.1 resolution.
    pub temperature: Option<f64>,
    /// Relative humidity in %, 0.1 resolution.
    pub humidity: Option<f64>,
    /// Battery level 0–100 %.
    pub battery: Option<u8>,
    /// Battery voltage in millivolts.
    pub voltage_mv: Option<u16>,
}

impl PartialReading {
    /// An empty reading to fill in field by field.
    #[must_use]
    pub fn empty(mac: MacAddress, received_at: Timestamp) -> Self {
        Self {
            mac,
            received_at,
            temperature: None,
            humidity: None,
            battery: None,
            voltage_mv: None,
        }
    }

    /// True when at least one field is populated.
    #[must_use]
    pub fn has_any_field(&self) -> bool {
        self.temperature.is_some()
            || self.humidity.is_some()
            || self.battery.is_some()
            || self.voltage_mv.is_some()
    }

    /// Check domain invariants: at least one field, all values in range.
    ///
    /// # Errors
    ///
    /// Returns the first violated [`ValidationError`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.has_any_field() {
            return Err(ValidationError::EmptyReading);
        }
        if let Some(t) = self.temperature {
            if !(TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&t) {
                return Err(ValidationError::TemperatureOutOfRange(t));
            }
        }
        if let Some(h) = self.humidity {
            if !(0.0..=100.0).contains(&h) {
                return Err(ValidationError::HumidityOutOfRange(h));
            }
        }
        if let Some(b) = self.battery {
            if b > 100 {
                return Err(ValidationError::BatteryOutOfRange(b));
            }
        }
        Ok(())
    }
}

/// The decoded contents of one MiBeacon frame.
///
/// Produced by the codec, consumed by the cache. `readings` preserves TLV
/// order so later duplicates within the frame win when applied in sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Model inferred from the product id.
    pub model: DeviceModel,
    /// Sequence counter from the frame header, used to suppress
    /// exact-duplicate repeats.
    pub frame_counter: u8,
    pub readings: Vec<PartialReading>,
}

/// Why a reading was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// First publish for the device, or a field moved past its delta.
    ThresholdBased,
    /// Heartbeat forced by the publish interval.
    Periodic,
}

impl MessageType {
    /// Label used in the MQTT state payload.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThresholdBased => "threshold-based",
            Self::Periodic => "periodic",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A fully assembled reading ready for publication.
///
/// Emitted by the cache only once temperature, humidity, and battery are all
/// known for the device; consumed by the publisher and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteReading {
    pub mac: MacAddress,
    pub friendly_name: Option<String>,
    pub model: DeviceModel,
    /// Temperature in °C, 0.1 resolution.
    pub temperature: f64,
    /// Relative humidity in %, 0.1 resolution.
    pub humidity: f64,
    /// Battery level 0–100 %.
    pub battery: u8,
    /// Battery voltage in millivolts, when the sensor advertises it.
    pub voltage_mv: Option<u16>,
    pub rssi: Option<i16>,
    pub signal: SignalQuality,
    /// Instant the freshest contributing advertisement arrived.
    pub last_seen: Timestamp,
    pub message_type: MessageType,
    /// Snapshot of the per-field statistics, taken in the same critical
    /// section that resets them.
    pub statistics: DeviceStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time;

    fn mac() -> MacAddress {
        MacAddress::parse("4C:65:A8:DC:84:01").unwrap()
    }

    #[test]
    fn should_reject_reading_without_fields() {
        let reading = PartialReading::empty(mac(), time::now());
        assert!(!reading.has_any_field());
        assert!(matches!(
            reading.validate(),
            Err(ValidationError::EmptyReading)
        ));
    }

    #[test]
    fn should_accept_single_field_reading() {
        let reading = PartialReading {
            temperature: Some(22.5),
            ..PartialReading::empty(mac(), time::now())
        };
        assert!(reading.has_any_field());
        assert!(reading.validate().is_ok());
    }

    #[test]
    fn should_accept_temperature_at_exact_bounds() {
        for t in [-40.0, 85.0] {
            let reading = PartialReading {
                temperature: Some(t),
                ..PartialReading::empty(mac(), time::now())
            };
            assert!(reading.validate().is_ok(), "temperature {t} should pass");
        }
    }

    #[test]
    fn should_reject_temperature_just_outside_bounds() {
        for t in [-40.1, 85.1] {
            let reading = PartialReading {
                temperature: Some(t),
                ..PartialReading::empty(mac(), time::now())
            };
            assert!(matches!(
                reading.validate(),
                Err(ValidationError::TemperatureOutOfRange(_))
            ));
        }
    }

    #[test]
    fn should_reject_humidity_above_hundred() {
        let reading = PartialReading {
            humidity: Some(100.1),
            ..PartialReading::empty(mac(), time::now())
        };
        assert!(matches!(
            reading.validate(),
            Err(ValidationError::HumidityOutOfRange(_))
        ));
    }

    #[test]
    fn should_reject_battery_above_hundred() {
        let reading = PartialReading {
            battery: Some(101),
            ..PartialReading::empty(mac(), time::now())
        };
        assert!(matches!(
            reading.validate(),
            Err(ValidationError::BatteryOutOfRange(101))
        ));
    }

    #[test]
    fn should_accept_voltage_only_reading() {
        let reading = PartialReading {
            voltage_mv: Some(2980),
            ..PartialReading::empty(mac(), time::now())
        };
        assert!(reading.validate().is_ok());
    }

    #[test]
    fn should_serialize_message_type_labels() {
        assert_eq!(
            serde_json::to_string(&MessageType::ThresholdBased).unwrap(),
            "\"threshold-based\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::Periodic).unwrap(),
            "\"periodic\""
        );
    }
}

//! RSSI classification into qualitative signal labels.

use std::fmt;

use serde::{Serialize, Serializer};

/// Qualitative signal strength, tuned for indoor BLE.
///
/// Band boundaries are inclusive at the upper bound: −50 dBm is still
/// `excellent`, −51 dBm is `good`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalQuality {
    Unknown,
    Excellent,
    Good,
    Fair,
    Weak,
    VeryWeak,
}

impl SignalQuality {
    /// Classify an RSSI value in dBm.
    #[must_use]
    pub fn from_rssi(rssi: Option<i16>) -> Self {
        match rssi {
            None => Self::Unknown,
            Some(v) if v >= -50 => Self::Excellent,
            Some(v) if v >= -60 => Self::Good,
            Some(v) if v >= -70 => Self::Fair,
            Some(v) if v >= -80 => Self::Weak,
            Some(_) => Self::VeryWeak,
        }
    }

    /// Label used in the MQTT state payload.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Weak => "weak",
            Self::VeryWeak => "very weak",
        }
    }
}

impl fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SignalQuality {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_label_missing_rssi_as_unknown() {
        assert_eq!(SignalQuality::from_rssi(None), SignalQuality::Unknown);
    }

    #[test]
    fn should_classify_band_upper_bounds_inclusively() {
        assert_eq!(SignalQuality::from_rssi(Some(-50)), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_rssi(Some(-51)), SignalQuality::Good);
        assert_eq!(SignalQuality::from_rssi(Some(-60)), SignalQuality::Good);
        assert_eq!(SignalQuality::from_rssi(Some(-61)), SignalQuality::Fair);
        assert_eq!(SignalQuality::from_rssi(Some(-70)), SignalQuality::Fair);
        assert_eq!(SignalQuality::from_rssi(Some(-71)), SignalQuality::Weak);
        assert_eq!(SignalQuality::from_rssi(Some(-80)), SignalQuality::Weak);
        assert_eq!(SignalQuality::from_rssi(Some(-81)), SignalQuality::VeryWeak);
    }

    #[test]
    fn should_classify_strong_signal_as_excellent() {
        assert_eq!(SignalQuality::from_rssi(Some(-30)), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_rssi(Some(0)), SignalQuality::Excellent);
    }

    #[test]
    fn should_render_labels_with_spaces() {
        assert_eq!(SignalQuality::VeryWeak.to_string(), "very weak");
        assert_eq!(SignalQuality::Fair.to_string(), "fair");
    }

    #[test]
    fn should_serialize_label_verbatim() {
        let json = serde_json::to_string(&SignalQuality::VeryWeak).unwrap();
        assert_eq!(json, "\"very weak\"");
    }
}

//! BLE MAC address — the identity every device record, topic, and
//! configuration entry is keyed on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// A 6-byte BLE MAC address.
///
/// Displayed as colon-separated uppercase hex (`4C:65:A8:DB:99:44`);
/// [`device_id`](Self::device_id) yields the topic-safe form without
/// separators (`4C65A8DB9944`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Wrap raw bytes in transmission order (first byte printed first).
    #[must_use]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Build from the little-endian byte order MiBeacon frames embed.
    #[must_use]
    pub fn from_le_bytes(bytes: [u8; 6]) -> Self {
        let mut reversed = bytes;
        reversed.reverse();
        Self(reversed)
    }

    /// Raw bytes in transmission order.
    #[must_use]
    pub const fn bytes(&self) -> [u8; 6] {
        self.0
    }

    /// Uppercase hex without separators, used in MQTT topics and unique ids
    /// (e.g. `4C65A8DB9944`).
    #[must_use]
    pub fn device_id(&self) -> String {
        self.0.iter().map(|b| format!("{b:02X}")).collect()
    }

    /// Parse from colon- or dash-separated hex, or 12 bare hex digits.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidMac`] when the input is not a
    /// 6-byte hex address.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let hex: String = input
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();
        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidMac(input.to_string()));
        }
        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| ValidationError::InvalidMac(input.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

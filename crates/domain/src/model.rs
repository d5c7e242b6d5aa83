//! Supported Xiaomi device models.

use std::fmt;

use serde::{Deserialize, Serialize};

/// MiBeacon product id advertised by LYWSDCGQ/01ZM sensors.
pub const PRODUCT_ID_LYWSDCGQ: u16 = 0x045B;
/// MiBeacon product id advertised by LYWSD03MMC sensors.
pub const PRODUCT_ID_LYWSD03MMC: u16 = 0x055B;

/// Sensor model inferred from the MiBeacon product id.
///
/// An unrecognised product id is a soft failure: the frame is still parsed
/// and the device flows through the cache and publisher tagged as
/// [`DeviceModel::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceModel {
    /// Mijia BLE Temperature Hygrometer 2 (square, e-ink).
    Lywsd03mmc,
    /// Original Mijia BLE Temperature Hygrometer (round, LCD).
    Lywsdcgq,
    /// Product id not in the supported table.
    Unknown,
}

impl DeviceModel {
    /// Map a MiBeacon product id to a model.
    #[must_use]
    pub fn from_product_id(product_id: u16) -> Self {
        match product_id {
            PRODUCT_ID_LYWSDCGQ => Self::Lywsdcgq,
            PRODUCT_ID_LYWSD03MMC => Self::Lywsd03mmc,
            _ => Self::Unknown,
        }
    }

    /// Model string used in Home Assistant discovery payloads.
    #[must_use]
    pub fn ha_model(&self) -> &'static str {
        match self {
            Self::Lywsd03mmc => "LYWSD03MMC",
            Self::Lywsdcgq => "LYWSDCGQ/01ZM",
            Self::Unknown => "Mijia BLE Thermometer",
        }
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ha_model())
    }
}

//! BLE scanner configuration.

use serde::Deserialize;

/// Configuration for the BLE scanner.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Index of the host Bluetooth adapter to own (hci0 = 0).
    pub adapter: usize,
    /// Capacity of the scanner event channel. When the consumer lags, the
    /// oldest pending events are dropped.
    pub channel_capacity: usize,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            adapter: 0,
            channel_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_have_sensible_defaults() {
        let config = BleConfig::default();
        assert_eq!(config.adapter, 0);
        assert_eq!(config.channel_capacity, 256);
    }
}

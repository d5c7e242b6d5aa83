//! BLE adapter error types.

use mijiableht_domain::error::MijiaError;
use mijiableht_domain::mac::MacAddress;

/// Errors specific to the BLE adapter.
#[derive(Debug, thiserror::Error)]
pub enum BleError {
    /// No BLE adapter exists at the configured index. Fatal.
    #[error("no BLE adapter available at index {0}")]
    AdapterUnavailable(usize),

    /// The OS denied access to the adapter. Fatal.
    #[error("BLE adapter access denied")]
    PermissionDenied,

    /// The adapter is held by another scan owner.
    #[error("BLE adapter busy")]
    AdapterBusy,

    /// Subscribing to adapter events did not complete within the deadline.
    #[error("BLE event subscription timed out")]
    SubscribeTimeout,

    /// BLE scan or adapter operation failed.
    #[error("BLE scan error")]
    Scan(#[source] btleplug::Error),
}

/// Details about why a MiBeacon frame was rejected.
///
/// All three are frame-level soft failures: they yield zero readings and
/// are logged at DEBUG, never propagated upward as hard errors.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame-control encrypted bit is set (bindkey frames unsupported).
    #[error("encrypted MiBeacon frame")]
    Encrypted,

    /// The frame is shorter than the fixed 11-byte header.
    #[error("frame too short: {actual} bytes, need at least 11")]
    Short {
        /// The actual length received.
        actual: usize,
    },

    /// The MAC embedded in the frame disagrees with the advertisement.
    #[error("embedded MAC {embedded} does not match advertised {advertised}")]
    MacMismatch {
        advertised: MacAddress,
        embedded: MacAddress,
    },
}

impl From<btleplug::Error> for BleError {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::PermissionDenied => Self::PermissionDenied,
            other => Self::Scan(other),
        }
    }
}

impl BleError {
    /// True for failures no amount of retrying will fix.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AdapterUnavailable(_) | Self::PermissionDenied
        )
    }

    /// Convert into a [`MijiaError::Adapter`] for propagation across crate
    /// boundaries.
    #[must_use]
    pub fn into_domain(self) -> MijiaError {
        MijiaError::Adapter(Box::new(self))
    }
}

impl From<BleError> for MijiaError {
    fn from(err: BleError) -> Self {
        err.into_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_adapter_unavailable_with_index() {
        let err = BleError::AdapterUnavailable(1);
        assert_eq!(err.to_string(), "no BLE adapter available at index 1");
    }

    #[test]
    fn should_classify_fatal_errors() {
        assert!(BleError::AdapterUnavailable(0).is_fatal());
        assert!(BleError::PermissionDenied.is_fatal());
        assert!(!BleError::AdapterBusy.is_fatal());
        assert!(!BleError::Scan(btleplug::Error::DeviceNotFound).is_fatal());
        assert!(!BleError::SubscribeTimeout.is_fatal());
    }

    #[test]
    fn should_map_permission_denied_from_btleplug() {
        let err: BleError = btleplug::Error::PermissionDenied.into();
        assert!(matches!(err, BleError::PermissionDenied));
    }

    #[test]
    fn should_display_mac_mismatch_with_both_addresses() {
        let err = FrameError::MacMismatch {
            advertised: MacAddress::parse("AA:BB:CC:DD:EE:FF").unwrap(),
            embedded: MacAddress::parse("11:22:33:44:55:66").unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "embedded MAC 11:22:33:44:55:66 does not match advertised AA:BB:CC:DD:EE:FF"
        );
    }

    #[test]
    fn should_convert_to_domain_error() {
        let err: MijiaError = BleError::AdapterBusy.into();
        assert!(matches!(err, MijiaError::Adapter(_)));
    }
}

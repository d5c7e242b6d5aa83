//! Common error types used across the workspace.
//!
//! Each layer defines its own concrete error types. The domain layer provides
//! [`ValidationError`]. Adapter layers define their own (e.g., `BleError`
//! wrapping `btleplug::Error`) and wire them into [`MijiaError`] via their
//! `into_domain()` conversions.

/// Validation failures raised by domain invariant checks.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),
    #[error("temperature {0} °C out of range -40..=85")]
    TemperatureOutOfRange(f64),
    #[error("humidity {0} % out of range 0..=100")]
    HumidityOutOfRange(f64),
    #[error("battery {0} % out of range 0..=100")]
    BatteryOutOfRange(u8),
    #[error("a partial reading must carry at least one field")]
    EmptyReading,
}

/// Top-level domain error.
///
/// Adapter crates may introduce additional variants by wrapping their own
/// error types behind the [`MijiaError::Adapter`] variant.
#[derive(Debug, thiserror::Error)]
pub enum MijiaError {
    #[error("Validation error")]
    Validation(#[from] ValidationError),

    #[error("Adapter error")]
    Adapter(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Convenience alias used throughout the domain and application layers.
pub type Result<T> = std::result::Result<T, MijiaError>;

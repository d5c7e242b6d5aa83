//! MQTT adapter error types.
//!
//! Broker authentication rejection is not an error value: it is a terminal
//! [`PublisherState::AuthFailed`](crate::PublisherState) transition observed
//! through the state watch.

use mijiableht_domain::error::MijiaError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// A publish did not complete within its deadline, even after a retry.
    #[error("MQTT publish timed out")]
    PublishTimeout,

    /// The rumqttc client returned an error.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// Failed to encode an outgoing payload as JSON.
    #[error("failed to encode MQTT payload")]
    Encode(#[source] serde_json::Error),
}

impl MqttError {
    /// Convert into a [`MijiaError::Adapter`] for propagation across crate
    /// boundaries.
    #[must_use]
    pub fn into_domain(self) -> MijiaError {
        MijiaError::Adapter(Box::new(self))
    }
}

impl From<MqttError> for MijiaError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_publish_timeout_error() {
        let err = MqttError::PublishTimeout;
        assert_eq!(err.to_string(), "MQTT publish timed out");
    }

    #[test]
    fn should_display_encode_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{{bad").unwrap_err();
        let err = MqttError::Encode(json_err);
        assert_eq!(err.to_string(), "failed to encode MQTT payload");
    }

    #[test]
    fn should_convert_to_domain_error() {
        let err: MijiaError = MqttError::PublishTimeout.into();
        assert!(matches!(err, MijiaError::Adapter(_)));
    }
}

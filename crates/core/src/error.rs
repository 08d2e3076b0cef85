//! Error types shared across Apex Gateway services

use thiserror::Error;

use crate::observability::ObservabilityError;
use crate::telemetry::TelemetryError;

/// Top-level error type for Apex Gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {message}")]
    ConfigurationError {
        message: String,
        /// Environment variable the error relates to, when known
        key: Option<String>,
    },

    #[error("Observability error: {0}")]
    Observability(#[from] ObservabilityError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = GatewayError::ConfigurationError {
            message: "port must be greater than 0".to_string(),
            key: Some("APEX_GATEWAY_SERVICE_PORT".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Configuration error: port must be greater than 0"
        );
    }

    #[test]
    fn test_internal_error_display() {
        let err = GatewayError::Internal("boom".to_string());
        assert_eq!(err.to_string(), "Internal error: boom");
    }
}

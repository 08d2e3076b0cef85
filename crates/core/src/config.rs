//! Shared configuration loader module for Apex Gateway services
//!
//! This module provides a unified configuration loading system with environment
//! variable parsing, validation, and support for .env files. All configuration
//! uses the `APEX_GATEWAY_` prefix for environment variables.
//!
//! # Features
//!
//! - Environment variable parsing with typed values
//! - .env file support via dotenvy
//! - Configuration validation with clear error messages
//! - Default values for optional fields
//! - Configuration override hierarchy: defaults < .env < environment
//!
//! # Example
//!
//! ```no_run
//! use apex_gateway_core::config::{load_dotenv, ConfigLoader, ServiceConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Load .env file (optional)
//! load_dotenv();
//!
//! // Load and validate configuration
//! let service_config = ServiceConfig::from_env()?;
//! service_config.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::error::GatewayError;

/// Configuration loader trait
///
/// Provides standardized methods for loading and validating configuration from
/// environment variables.
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables
    ///
    /// Reads environment variables with the `APEX_GATEWAY_` prefix and
    /// constructs a configuration instance with defaults for missing optional
    /// values.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if:
    /// - Required environment variables are missing
    /// - Environment variable values cannot be parsed
    /// - Values are outside acceptable ranges
    fn from_env() -> Result<Self, GatewayError>;

    /// Validate configuration values
    ///
    /// Performs validation checks on all configuration fields to ensure they
    /// meet requirements (e.g., valid port ranges, positive worker counts).
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if any validation check fails.
    fn validate(&self) -> Result<(), GatewayError>;
}

/// Service configuration
///
/// Configuration for HTTP service settings including host, port, and workers.
/// Logging and tracing have their own configuration types in the
/// observability and telemetry modules.
///
/// # Environment Variables
///
/// - `APEX_GATEWAY_SERVICE_HOST` (optional): Service bind host (default: "0.0.0.0")
/// - `APEX_GATEWAY_SERVICE_PORT` (optional): Service bind port (default: 8080)
/// - `APEX_GATEWAY_SERVICE_WORKERS` (optional): Number of worker threads (default: CPU count)
///
/// # Example
///
/// ```bash
/// export APEX_GATEWAY_SERVICE_HOST="127.0.0.1"
/// export APEX_GATEWAY_SERVICE_PORT="3000"
/// export APEX_GATEWAY_SERVICE_WORKERS="4"
/// ```
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service bind host
    pub host: String,
    /// Service bind port
    pub port: u16,
    /// Number of worker threads
    pub workers: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: num_cpus::get(),
        }
    }
}

impl ConfigLoader for ServiceConfig {
    fn from_env() -> Result<Self, GatewayError> {
        let host = std::env::var("APEX_GATEWAY_SERVICE_HOST")
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or_else(|_| ServiceConfig::default().host);

        let port = if std::env::var("APEX_GATEWAY_SERVICE_PORT").is_ok() {
            parse_env_var("APEX_GATEWAY_SERVICE_PORT", ServiceConfig::default().port)?
        } else {
            parse_env_var("PORT", ServiceConfig::default().port)?
        };

        let workers = parse_env_var(
            "APEX_GATEWAY_SERVICE_WORKERS",
            ServiceConfig::default().workers,
        )?;

        Ok(Self {
            host,
            port,
            workers,
        })
    }

    fn validate(&self) -> Result<(), GatewayError> {
        // Validate port range
        if self.port == 0 {
            return Err(GatewayError::ConfigurationError {
                message: "port must be greater than 0".to_string(),
                key: Some("APEX_GATEWAY_SERVICE_PORT".to_string()),
            });
        }

        // Validate workers
        if self.workers == 0 {
            return Err(GatewayError::ConfigurationError {
                message: "workers must be greater than 0".to_string(),
                key: Some("APEX_GATEWAY_SERVICE_WORKERS".to_string()),
            });
        }

        Ok(())
    }
}

/// Helper function to parse environment variable with default value
///
/// # Type Parameters
///
/// * `T` - The type to parse into (must implement FromStr)
///
/// # Arguments
///
/// * `key` - The environment variable key
/// * `default` - The default value if the variable is not set
///
/// # Returns
///
/// The parsed value or default if not set
///
/// # Errors
///
/// Returns a `ConfigurationError` if the value cannot be parsed
fn parse_env_var<T>(key: &str, default: T) -> Result<T, GatewayError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.parse::<T>().map_err(|e| GatewayError::ConfigurationError {
                message: format!("Failed to parse {}: {}", key, e),
                key: Some(key.to_string()),
            })
        })
        .unwrap_or(Ok(default))
}

/// Load .env file if present
///
/// This is a convenience function that loads environment variables from a .env
/// file using dotenvy. It does not return an error if the .env file is not
/// found.
///
/// # Example
///
/// ```no_run
/// use apex_gateway_core::config::load_dotenv;
///
/// // Load .env file at the start of your application
/// load_dotenv();
/// ```
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        // Only log if it's not a "file not found" error
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }
}

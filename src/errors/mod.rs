//! # Error Handling
//!
//! Crate-level error type used during startup, configuration loading and
//! bootstrap. Request-path failures use the narrower per-subsystem errors
//! (`SsrfError`, `SecretsError`, `TransformError`) that converge into
//! [`crate::proxy::GatewayError`].

/// Custom result type for Flowgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Flowgate gateway
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors for bootstrap data (routes, connectors, secrets)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network transport errors (listener bind, HTTP client construction)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bootstrap document could not be parsed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Self::Config(format!("Configuration loading failed: {}", error))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = Error::config("missing key");
        assert!(matches!(error, Error::Config(_)));
        assert_eq!(error.to_string(), "Configuration error: missing key");
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::Io(_)));

        let yaml_error = serde_yaml::from_str::<Vec<String>>("{not: [valid").unwrap_err();
        let error: Error = yaml_error.into();
        assert!(matches!(error, Error::Serialization(_)));
    }
}

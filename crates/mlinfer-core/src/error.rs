//! Error types for mlinfer

use thiserror::Error;

/// Main error type for mlinfer
#[derive(Error, Debug)]
pub enum MlinferError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Artifact could not be resolved or downloaded
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Model descriptor is missing or malformed
    #[error("Descriptor error: {0}")]
    Descriptor(String),

    /// The model does not carry the pyfunc flavor
    #[error("Only pyfunc flavours are supported")]
    UnsupportedFlavor,

    /// Operation not available on this platform
    #[error("{0} platform is not supported")]
    UnsupportedPlatform(String),

    /// External process failed to start or exited with an error
    #[error("Process error: {0}")]
    Process(String),

    /// Backend runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Image build error
    #[error("Build error: {0}")]
    Build(String),

    /// Prediction failed
    #[error("Prediction error: {0}")]
    Predict(String),

    /// No model has been loaded
    #[error("Model not initialized: {0}")]
    ModelNotLoaded(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for mlinfer operations
pub type MlinferResult<T> = Result<T, MlinferError>;

impl From<serde_json::Error> for MlinferError {
    fn from(err: serde_json::Error) -> Self {
        MlinferError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for MlinferError {
    fn from(err: serde_yaml::Error) -> Self {
        MlinferError::Descriptor(err.to_string())
    }
}

impl From<config::ConfigError> for MlinferError {
    fn from(err: config::ConfigError) -> Self {
        MlinferError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for MlinferError {
    fn from(err: toml::ser::Error) -> Self {
        MlinferError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MlinferError::Config("invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: invalid config");
    }

    #[test]
    fn test_unsupported_messages() {
        assert_eq!(
            MlinferError::UnsupportedFlavor.to_string(),
            "Only pyfunc flavours are supported"
        );
        assert_eq!(
            MlinferError::UnsupportedPlatform("Windows".to_string()).to_string(),
            "Windows platform is not supported"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MlinferError = io_err.into();
        assert!(matches!(err, MlinferError::Io(_)));
    }

    #[test]
    fn test_error_from_yaml() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("a: [1, 2").unwrap_err();
        let err: MlinferError = yaml_err.into();
        assert!(matches!(err, MlinferError::Descriptor(_)));
    }
}

//! Error types for kubespresso

use thiserror::Error;

/// Result type for the controller
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the controller
#[derive(Debug, Error)]
pub enum Error {
    /// Could not build a client for the cluster
    #[error("Cluster login error: {0}")]
    ClusterLogin(String),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(String),

    /// The coffee machine refused or could not be reached
    #[error("Coffee machine error: {0}")]
    CoffeeMachine(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// An `expectedDuration` value that cannot be parsed
    #[error("Invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        Error::Kube(err.to_string())
    }
}

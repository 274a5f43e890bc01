use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected registry response ({status}): {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Registry response carried no index header")]
    MissingIndex,

    #[error("Invalid registry index: {0}")]
    InvalidIndex(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

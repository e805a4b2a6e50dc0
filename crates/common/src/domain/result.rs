use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Private key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Token signing failed: {0}")]
    SigningFailure(String),

    #[error("Broker rejected credentials: {0}")]
    AuthRejected(String),

    #[error("Failed to connect to broker: {0}")]
    ConnectFailure(String),

    #[error("Publish failed: {0}")]
    PublishFailure(String),

    #[error("Sensor read failed: {0}")]
    SensorReadFailure(String),

    #[error("Envelope encoding failed: {0}")]
    EncodingFailure(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

//! Error types for the member events worker.

use thiserror::Error;

/// Errors raised while loading or validating worker configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration loading failed: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Errors raised while decoding a queue message body into an event
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Message body is empty")]
    EmptyBody,

    #[error("Message body is not a valid member-created event: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Errors raised while wiring the consumer's dependencies at startup
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to create SQS transport: {0}")]
    Transport(#[from] member_queue::AwsError),

    #[error("Failed to create member service client: {0}")]
    MemberService(anyhow::Error),
}

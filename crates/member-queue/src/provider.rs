//! Provider types and configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;

/// Enumeration of supported queue transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    AwsSqs,
    InMemory,
}

impl ProviderType {
    /// Largest batch a single receive or batch delete may carry
    pub fn max_batch_size(&self) -> u32 {
        match self {
            Self::AwsSqs => 10,
            Self::InMemory => 100,
        }
    }

    /// Longest long-poll wait the provider honours
    pub fn max_wait_time(&self) -> Duration {
        match self {
            Self::AwsSqs => Duration::from_secs(20),
            Self::InMemory => Duration::from_secs(60),
        }
    }
}

/// Receive behaviour shared by every client a registry creates
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveSettings {
    /// Messages requested per receive call
    pub max_messages: u32,
    /// Long-poll wait per receive call
    pub wait_time: Duration,
    /// Pause after a receive returned nothing
    pub empty_poll_delay: Duration,
}

impl Default for ReceiveSettings {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time: Duration::from_secs(20),
            empty_poll_delay: Duration::from_secs(180),
        }
    }
}

/// AWS SQS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsSqsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Endpoint override (LocalStack, VPC endpoints); defaults to the
    /// regional SQS endpoint
    pub endpoint: Option<String>,
}

impl Default for AwsSqsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            endpoint: None,
        }
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryConfig {
    /// How long a received message stays hidden before redelivery
    pub visibility_timeout: Duration,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
        }
    }
}

//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name following SQS naming rules
///
/// 1-80 characters of ASCII alphanumerics, hyphens and underscores, with an
/// optional `.fifo` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Maximum queue name length accepted by SQS (including `.fifo`)
    pub const MAX_LENGTH: usize = 80;

    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > Self::MAX_LENGTH {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: format!("must be 1-{} characters", Self::MAX_LENGTH),
            });
        }

        let base = name.strip_suffix(".fifo").unwrap_or(&name);
        if base.is_empty()
            || !base
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, and underscores allowed".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the name refers to a FIFO queue
    pub fn is_fifo(&self) -> bool {
        self.0.ends_with(".fifo")
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Transport-assigned identifier of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Opaque token required to delete (acknowledge) a received message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Wrap a transport-issued receipt token
    pub fn new(handle: String) -> Self {
        Self(handle)
    }

    /// Get handle string
    pub fn handle(&self) -> &str {
        &self.0
    }
}

/// A message received from a queue
///
/// Owned by the transport; consumers only read it and acknowledge it through
/// its receipt handle.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: String,
    /// Hash of the body as reported by the transport (MD5 for SQS)
    pub content_hash: String,
    pub receipt_handle: ReceiptHandle,
    /// Approximate number of times the transport has handed out this message
    pub delivery_count: u32,
    pub received_at: Timestamp,
}

impl ReceivedMessage {
    /// Build a received message, hashing the body when the transport did not
    /// report a checksum.
    pub fn new(
        message_id: MessageId,
        body: String,
        content_hash: Option<String>,
        receipt_handle: ReceiptHandle,
        delivery_count: u32,
    ) -> Self {
        let content_hash = content_hash
            .filter(|hash| !hash.is_empty())
            .unwrap_or_else(|| content_hash_of(&body));

        Self {
            message_id,
            body,
            content_hash,
            receipt_handle,
            delivery_count,
            received_at: Timestamp::now(),
        }
    }

    /// Check if the transport has delivered this message before
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// Hex-encoded SHA-256 of a message body
pub fn content_hash_of(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

//! Member lifecycle events carried on the queue.

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;

/// Prefix of idempotency keys for verification email sends
pub const IDEMPOTENCY_KEY_PREFIX: &str = "MemberCreatedEventHandler";

/// A member account was created
///
/// Decoded from a JSON body such as `{"memberId":101,"email":"x@y.com"}`.
/// Both fields are required. PascalCase field names are accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberCreatedEvent {
    #[serde(alias = "MemberId")]
    pub member_id: i64,

    #[serde(alias = "Email")]
    pub email: String,
}

impl MemberCreatedEvent {
    /// Decode an event from a message body
    pub fn decode(body: &str) -> Result<Self, DecodeError> {
        if body.trim().is_empty() {
            return Err(DecodeError::EmptyBody);
        }

        Ok(serde_json::from_str(body)?)
    }

    /// Key under which a successful verification email send is remembered
    pub fn idempotency_key(&self) -> String {
        format!("{}-{}", IDEMPOTENCY_KEY_PREFIX, self.member_id)
    }
}

//! # Member Queue
//!
//! Durable queue access for member lifecycle events, backed by AWS SQS in
//! production and an in-memory transport for tests and local development.
//!
//! This library provides:
//! - One initialised client per queue name through a shared registry
//! - Bounded long-poll receives with an empty-poll cool-down
//! - A lazy, cancellable message stream that acknowledges each batch as it
//!   is received
//! - Best-effort duplicate suppression keyed on message content
//!
//! ## Module Organization
//!
//! - [error] - Error types for all queue operations
//! - [message] - Queue names, identifiers and received messages
//! - [provider] - Provider types and configuration
//! - [client] - Transport trait and per-queue client
//! - [registry] - Process-wide client registry
//! - [stream] - Message stream over a client
//! - [dedup] - Content-hash dedup cache
//! - [shutdown] - Cooperative cancellation
//! - [providers] - SQS and in-memory transports

// Module declarations
pub mod client;
pub mod dedup;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod shutdown;
pub mod stream;

// Re-export commonly used types at crate root for convenience
pub use client::{DeleteEntry, DeleteFailure, QueueClient, QueueTransport};
pub use dedup::{DedupCache, DEFAULT_DEDUP_TTL};
pub use error::{ConfigurationError, QueueError, ValidationError};
pub use message::{
    content_hash_of, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp,
};
pub use provider::{AwsSqsConfig, InMemoryConfig, ProviderType, ReceiveSettings};
pub use providers::{AwsError, AwsSqsTransport, InMemoryTransport};
pub use registry::QueueClientRegistry;
pub use shutdown::{shutdown_channel, ShutdownController, ShutdownSignal};
pub use stream::MessageStream;

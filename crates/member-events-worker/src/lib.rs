//! # Member Events Worker
//!
//! Consumes member-created events from a durable queue and sends each new
//! member a signup verification email, with duplicate suppression, bounded
//! retry and graceful shutdown.
//!
//! ## Module Organization
//!
//! - [config] - Layered worker configuration
//! - [consumer] - The event consumer loop
//! - [error] - Configuration and decode errors
//! - [events] - Queue event payloads
//! - [idempotency] - Record of emails already sent
//! - [member_service] - Member service capability and its HTTP implementation
//! - [retry] - Exponential backoff policy
//! - [startup] - Dependency wiring for the binary

pub mod config;
pub mod consumer;
pub mod error;
pub mod events;
pub mod idempotency;
pub mod member_service;
pub mod retry;
pub mod startup;

pub use self::config::WorkerConfig;
pub use consumer::{
    ConsumerOutcome, ConsumerSettings, ConsumerStats, EventConsumer, MessageOutcome, StopReason,
};
pub use error::{ConfigError, DecodeError, StartupError};
pub use events::MemberCreatedEvent;
pub use idempotency::IdempotencyCache;
pub use member_service::{
    HttpMemberService, HttpServiceScopeFactory, MemberService, ServiceScope, ServiceScopeFactory,
};
pub use retry::{RetryPolicy, RetryState};
pub use startup::{build_consumer, Startup};

//! Dependency wiring for the worker binary.

use crate::config::WorkerConfig;
use crate::consumer::{ConsumerSettings, EventConsumer};
use crate::error::StartupError;
use crate::idempotency::IdempotencyCache;
use crate::member_service::HttpServiceScopeFactory;
use member_queue::{AwsSqsTransport, DedupCache, QueueClientRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;

/// Result of wiring the worker
pub enum Startup {
    /// No queue is configured; nothing was built
    Disabled,
    /// Consumer ready to run
    Ready(EventConsumer),
}

/// Build the consumer and its dependencies from validated configuration
///
/// The SQS transport is only created when a queue is configured, so an
/// environment without a queue needs no AWS credentials.
///
/// # Errors
///
/// Returns [`StartupError`] when the SQS transport or the member service
/// client cannot be created.
pub fn build_consumer(config: &WorkerConfig) -> Result<Startup, StartupError> {
    let Some(queue_name) = config.queue_name() else {
        info!("No queue configured; member events consumer disabled");
        return Ok(Startup::Disabled);
    };

    let transport = AwsSqsTransport::new(config.aws_sqs_config())?;

    let scopes = HttpServiceScopeFactory::new(
        &config.member_service.base_url,
        Duration::from_secs(config.member_service.timeout_seconds),
    )
    .map_err(StartupError::MemberService)?;

    let registry = Arc::new(QueueClientRegistry::new(
        Arc::new(transport),
        DedupCache::new(config.dedup_ttl()),
        config.receive_settings(),
    ));

    Ok(Startup::Ready(EventConsumer::new(
        ConsumerSettings {
            queue_name: Some(queue_name.to_string()),
            send_verification_email: config.features.send_verification_email,
        },
        registry,
        Arc::new(scopes),
        IdempotencyCache::new(config.idempotency_ttl()),
        config.retry_policy(),
    )))
}

//! Long-running consumer turning member-created events into verification emails.
//!
//! Lifecycle: resolve the configured queue through the registry, open a
//! message stream on it, then handle each message in order until shutdown.
//! Per message the steps run strictly in this order:
//!
//! 1. Decode the body into a [`MemberCreatedEvent`]; malformed bodies are
//!    logged and treated as handled.
//! 2. Skip the member if a verification email was already sent within the
//!    idempotency window.
//! 3. Skip if the verification email feature is disabled.
//! 4. Send with bounded retry, opening a fresh service scope per attempt, and
//!    record the idempotency key on success.
//!
//! Nothing here returns an error to the host; every failure is logged and
//! reflected in the [`ConsumerOutcome`].

use crate::events::MemberCreatedEvent;
use crate::idempotency::IdempotencyCache;
use crate::member_service::ServiceScopeFactory;
use crate::retry::{RetryPolicy, RetryState};
use member_queue::{QueueClientRegistry, ReceivedMessage, ShutdownSignal};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;

/// Static settings of a consumer
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Queue to consume; absent or blank disables the consumer
    pub queue_name: Option<String>,

    /// Whether verification emails are sent at all
    pub send_verification_email: bool,
}

/// Why [`EventConsumer::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No queue name configured
    Disabled,
    /// The queue client could not be created
    QueueUnavailable,
    /// Shutdown was requested
    Cancelled,
}

/// Result of handling one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Body could not be decoded
    Malformed,
    /// Verification email already sent for this member
    AlreadyProcessed,
    /// Feature flag off
    FeatureDisabled,
    /// Email sent
    Sent { attempts: u32 },
    /// Every attempt failed; the message is dropped
    Failed { attempts: u32 },
    /// Shutdown interrupted the retry backoff
    Abandoned { attempts: u32 },
}

/// Counters accumulated over one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub malformed: u64,
    pub already_processed: u64,
    pub feature_disabled: u64,
    pub sent: u64,
    pub failed: u64,
    pub abandoned: u64,
    /// Send attempts across all messages
    pub send_attempts: u64,
}

impl ConsumerStats {
    fn record(&mut self, outcome: MessageOutcome) {
        self.received += 1;
        match outcome {
            MessageOutcome::Malformed => self.malformed += 1,
            MessageOutcome::AlreadyProcessed => self.already_processed += 1,
            MessageOutcome::FeatureDisabled => self.feature_disabled += 1,
            MessageOutcome::Sent { attempts } => {
                self.sent += 1;
                self.send_attempts += u64::from(attempts);
            }
            MessageOutcome::Failed { attempts } => {
                self.failed += 1;
                self.send_attempts += u64::from(attempts);
            }
            MessageOutcome::Abandoned { attempts } => {
                self.abandoned += 1;
                self.send_attempts += u64::from(attempts);
            }
        }
    }
}

/// Terminal state of a consumer run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOutcome {
    pub reason: StopReason,
    pub stats: ConsumerStats,
}

/// Consumer of member-created events
pub struct EventConsumer {
    settings: ConsumerSettings,
    registry: Arc<QueueClientRegistry>,
    scopes: Arc<dyn ServiceScopeFactory>,
    idempotency: IdempotencyCache,
    retry_policy: RetryPolicy,
}

impl EventConsumer {
    pub fn new(
        settings: ConsumerSettings,
        registry: Arc<QueueClientRegistry>,
        scopes: Arc<dyn ServiceScopeFactory>,
        idempotency: IdempotencyCache,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            settings,
            registry,
            scopes,
            idempotency,
            retry_policy,
        }
    }

    /// Consume until shutdown is requested
    ///
    /// Returns immediately when no queue is configured or the queue cannot be
    /// resolved; neither case is retried.
    pub async fn run(&self, shutdown: ShutdownSignal) -> ConsumerOutcome {
        let mut stats = ConsumerStats::default();

        let Some(queue_name) = self
            .settings
            .queue_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        else {
            info!("No queue name configured; member events consumer disabled");
            return ConsumerOutcome {
                reason: StopReason::Disabled,
                stats,
            };
        };

        let client = match self.registry.get_or_create(queue_name).await {
            Ok(client) => client,
            Err(e) => {
                error!(
                    queue = %queue_name,
                    error = %e,
                    "Unable to open queue; member events consumer stopping"
                );
                return ConsumerOutcome {
                    reason: StopReason::QueueUnavailable,
                    stats,
                };
            }
        };

        info!(
            queue = %queue_name,
            send_verification_email = self.settings.send_verification_email,
            "Member events consumer started"
        );

        let mut stream = client.read_message_stream(shutdown.clone());
        while let Some(message) = stream.next().await {
            let outcome = self.handle_message(&message, &shutdown).await;
            stats.record(outcome);
        }

        info!(
            queue = %queue_name,
            received = stats.received,
            sent = stats.sent,
            failed = stats.failed,
            "Member events consumer stopped"
        );

        ConsumerOutcome {
            reason: StopReason::Cancelled,
            stats,
        }
    }

    /// Handle one message
    pub async fn handle_message(
        &self,
        message: &ReceivedMessage,
        shutdown: &ShutdownSignal,
    ) -> MessageOutcome {
        let event = match MemberCreatedEvent::decode(&message.body) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    error = %e,
                    "Discarding undecodable member event"
                );
                return MessageOutcome::Malformed;
            }
        };

        let key = event.idempotency_key();
        if self.idempotency.contains(&key).await {
            debug!(
                member_id = event.member_id,
                message_id = %message.message_id,
                "Verification email already sent for member; skipping"
            );
            return MessageOutcome::AlreadyProcessed;
        }

        if !self.settings.send_verification_email {
            debug!(
                member_id = event.member_id,
                "Verification email feature disabled; skipping"
            );
            return MessageOutcome::FeatureDisabled;
        }

        let outcome = self.send_with_retry(event.member_id, shutdown).await;
        if let MessageOutcome::Sent { .. } = outcome {
            self.idempotency.record(&key).await;
        }
        outcome
    }

    async fn send_with_retry(&self, member_id: i64, shutdown: &ShutdownSignal) -> MessageOutcome {
        let mut shutdown = shutdown.clone();
        let mut state = RetryState::new();

        loop {
            let attempt = state.begin_attempt();

            match self.send_once(member_id).await {
                Ok(()) => {
                    info!(member_id, attempt, "Signup verification email sent");
                    return MessageOutcome::Sent { attempts: attempt };
                }
                Err(e) => warn!(
                    member_id,
                    attempt,
                    max_attempts = self.retry_policy.max_attempts,
                    error = %e,
                    "Failed to send signup verification email"
                ),
            }

            if !state.can_retry(&self.retry_policy) {
                error!(
                    member_id,
                    attempts = attempt,
                    "Giving up on signup verification email"
                );
                return MessageOutcome::Failed { attempts: attempt };
            }

            if shutdown.is_cancelled() {
                info!(member_id, attempts = attempt, "Shutdown requested; abandoning retries");
                return MessageOutcome::Abandoned { attempts: attempt };
            }

            let delay = state.next_delay(&self.retry_policy);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => {
                    info!(member_id, attempts = attempt, "Shutdown requested; abandoning retries");
                    return MessageOutcome::Abandoned { attempts: attempt };
                }
            }
        }
    }

    /// One attempt in a fresh scope; the scope is dropped when the call ends
    async fn send_once(&self, member_id: i64) -> anyhow::Result<()> {
        let scope = self.scopes.create_scope()?;
        scope
            .member_service()
            .send_signup_verification_email(member_id)
            .await
    }
}

impl std::fmt::Debug for EventConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventConsumer")
            .field("settings", &self.settings)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

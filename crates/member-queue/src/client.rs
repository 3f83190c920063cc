//! Transport trait and the per-queue client built on top of it.

use crate::dedup::DedupCache;
use crate::error::QueueError;
use crate::message::{QueueName, ReceiptHandle, ReceivedMessage};
use crate::provider::{ProviderType, ReceiveSettings};
use crate::shutdown::ShutdownSignal;
use crate::stream::MessageStream;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

// ============================================================================
// Transport
// ============================================================================

/// Entry of a batch delete request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteEntry {
    /// Identifier unique within one request
    pub id: String,
    pub receipt_handle: ReceiptHandle,
}

/// Entry the transport refused to delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub id: String,
    pub code: String,
    pub message: String,
}

/// Wire contract of a named durable queue (implemented per provider)
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Resolve the network address of a queue
    async fn resolve_queue_url(&self, queue: &QueueName) -> Result<String, QueueError>;

    /// Receive up to `max_messages`, waiting at most `wait_time` for any to arrive
    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: u32,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Delete a single message
    async fn delete_message(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError>;

    /// Delete several messages in one request, returning the entries that failed
    async fn delete_message_batch(
        &self,
        queue_url: &str,
        entries: &[DeleteEntry],
    ) -> Result<Vec<DeleteFailure>, QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

// ============================================================================
// QueueClient
// ============================================================================

/// Single point of access to one named queue
///
/// Receive and delete failures never escape this type: they are logged and
/// surface as an empty batch or a `false` result. The transport offers
/// at-least-once delivery, so the same message may be handed out more than
/// once; [`QueueClient::is_duplicate`] and [`QueueClient::cache_seen`] provide
/// best-effort suppression through the shared [`DedupCache`].
pub struct QueueClient {
    queue_name: QueueName,
    transport: Arc<dyn QueueTransport>,
    dedup: DedupCache,
    settings: ReceiveSettings,
    queue_url: OnceCell<String>,
}

impl QueueClient {
    /// Create an uninitialised client; call [`QueueClient::initialise`] before use
    pub fn new(
        queue_name: QueueName,
        transport: Arc<dyn QueueTransport>,
        dedup: DedupCache,
        settings: ReceiveSettings,
    ) -> Self {
        Self {
            queue_name,
            transport,
            dedup,
            settings,
            queue_url: OnceCell::new(),
        }
    }

    /// Resolve and cache the queue address
    ///
    /// The transport is asked at most once per successful resolution; a failed
    /// resolution is not cached.
    pub async fn initialise(&self) -> Result<&str, QueueError> {
        let url = self
            .queue_url
            .get_or_try_init(|| async {
                let url = self.transport.resolve_queue_url(&self.queue_name).await?;
                info!(queue = %self.queue_name, queue_url = %url, "Resolved queue address");
                Ok::<_, QueueError>(url)
            })
            .await?;

        Ok(url.as_str())
    }

    /// Queue this client is bound to
    pub fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }

    /// Resolved queue address, if initialised
    pub fn queue_url(&self) -> Option<&str> {
        self.queue_url.get().map(String::as_str)
    }

    /// Receive settings in effect
    pub fn settings(&self) -> &ReceiveSettings {
        &self.settings
    }

    fn require_url(&self) -> Result<&str, QueueError> {
        self.queue_url()
            .ok_or_else(|| QueueError::NotInitialised {
                queue_name: self.queue_name.to_string(),
            })
    }

    /// Perform one bounded long-poll receive
    ///
    /// An empty result means either the queue had nothing to deliver or the
    /// receive failed; failures are logged, never returned.
    pub async fn read_messages(&self) -> Vec<ReceivedMessage> {
        let provider = self.transport.provider_type();
        let max_messages = self
            .settings
            .max_messages
            .clamp(1, provider.max_batch_size());
        let wait_time = self.settings.wait_time.min(provider.max_wait_time());

        let result = match self.require_url() {
            Ok(url) => {
                self.transport
                    .receive_messages(url, max_messages, wait_time)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(messages) => {
                debug!(
                    queue = %self.queue_name,
                    count = messages.len(),
                    "Received message batch"
                );
                messages
            }
            Err(e) => {
                warn!(
                    queue = %self.queue_name,
                    error = %e,
                    transient = e.is_transient(),
                    "Failed to receive messages"
                );
                Vec::new()
            }
        }
    }

    /// Open a lazy, cancellable stream of messages
    ///
    /// See [`MessageStream`] for the delivery protocol.
    pub fn read_message_stream(self: &Arc<Self>, shutdown: ShutdownSignal) -> MessageStream {
        MessageStream::new(Arc::clone(self), shutdown)
    }

    /// Delete one message; returns `false` on failure
    pub async fn delete_message(&self, message: &ReceivedMessage) -> bool {
        let result = match self.require_url() {
            Ok(url) => {
                self.transport
                    .delete_message(url, &message.receipt_handle)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!(
                    queue = %self.queue_name,
                    message_id = %message.message_id,
                    "Deleted message"
                );
                true
            }
            Err(e) => {
                warn!(
                    queue = %self.queue_name,
                    message_id = %message.message_id,
                    error = %e,
                    "Failed to delete message"
                );
                false
            }
        }
    }

    /// Delete a batch of messages; returns `false` if any deletion failed
    ///
    /// Batches larger than the provider limit are split into several requests.
    pub async fn delete_messages(&self, batch: &[ReceivedMessage]) -> bool {
        if batch.is_empty() {
            return true;
        }

        let url = match self.require_url() {
            Ok(url) => url,
            Err(e) => {
                warn!(queue = %self.queue_name, error = %e, "Failed to delete message batch");
                return false;
            }
        };

        let chunk_size = self.transport.provider_type().max_batch_size() as usize;
        let mut all_deleted = true;

        for chunk in batch.chunks(chunk_size) {
            let entries: Vec<DeleteEntry> = chunk
                .iter()
                .enumerate()
                .map(|(index, message)| DeleteEntry {
                    id: format!("msg-{}", index),
                    receipt_handle: message.receipt_handle.clone(),
                })
                .collect();

            match self.transport.delete_message_batch(url, &entries).await {
                Ok(failures) if failures.is_empty() => {
                    debug!(
                        queue = %self.queue_name,
                        count = entries.len(),
                        "Deleted message batch"
                    );
                }
                Ok(failures) => {
                    all_deleted = false;
                    for failure in &failures {
                        warn!(
                            queue = %self.queue_name,
                            entry = %failure.id,
                            code = %failure.code,
                            message = %failure.message,
                            "Batch delete entry failed"
                        );
                    }
                }
                Err(e) => {
                    all_deleted = false;
                    warn!(
                        queue = %self.queue_name,
                        count = entries.len(),
                        error = %e,
                        "Failed to delete message batch"
                    );
                }
            }
        }

        all_deleted
    }

    /// Check whether this message's content was already yielded within the dedup TTL
    pub async fn is_duplicate(&self, message: &ReceivedMessage) -> bool {
        self.dedup
            .contains(&self.queue_name, &message.content_hash)
            .await
    }

    /// Record this message's content as yielded
    pub async fn cache_seen(&self, message: &ReceivedMessage) {
        self.dedup
            .insert(&self.queue_name, &message.content_hash)
            .await;
    }
}

impl std::fmt::Debug for QueueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueClient")
            .field("queue_name", &self.queue_name)
            .field("queue_url", &self.queue_url.get())
            .field("provider", &self.transport.provider_type())
            .field("settings", &self.settings)
            .finish()
    }
}

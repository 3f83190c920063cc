//! In-memory queue transport for testing and local development.
//!
//! Behaves like a standard SQS queue:
//! - Queues must be created before their address can be resolved
//! - Received messages stay hidden for the visibility timeout, then are
//!   handed out again with an incremented delivery count
//! - Receives long-poll until a message is enqueued or the wait elapses
//!
//! Failure injection hooks let tests exercise the error paths of consumers.

use crate::client::{DeleteEntry, DeleteFailure, QueueTransport};
use crate::error::QueueError;
use crate::message::{MessageId, QueueName, ReceiptHandle, ReceivedMessage};
use crate::provider::{InMemoryConfig, ProviderType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

const URL_SCHEME: &str = "memory://";

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in the queue with delivery metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: String,
    delivery_count: u32,
    /// Current receipt, set while the message is in flight
    receipt: Option<String>,
    visible_at: Instant,
}

#[derive(Default)]
struct InMemoryQueue {
    messages: Vec<StoredMessage>,
    deleted: usize,
}

#[derive(Default)]
struct CallCounters {
    resolve: AtomicUsize,
    receive: AtomicUsize,
    delete: AtomicUsize,
    delete_batch: AtomicUsize,
}

// ============================================================================
// InMemoryTransport
// ============================================================================

/// In-memory queue transport
///
/// Clones share the same queues.
#[derive(Clone)]
pub struct InMemoryTransport {
    queues: Arc<Mutex<HashMap<QueueName, InMemoryQueue>>>,
    config: InMemoryConfig,
    arrivals: Arc<Notify>,
    calls: Arc<CallCounters>,
    failing_receives: Arc<AtomicU32>,
    failing_deletes: Arc<AtomicBool>,
    resolve_delay: Arc<Mutex<Option<Duration>>>,
}

impl InMemoryTransport {
    /// Create new in-memory transport with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            config,
            arrivals: Arc::new(Notify::new()),
            calls: Arc::new(CallCounters::default()),
            failing_receives: Arc::new(AtomicU32::new(0)),
            failing_deletes: Arc::new(AtomicBool::new(false)),
            resolve_delay: Arc::new(Mutex::new(None)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<QueueName, InMemoryQueue>> {
        self.queues
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a queue; creating an existing queue is a no-op
    pub fn create_queue(&self, name: &str) -> Result<QueueName, QueueError> {
        let queue_name = QueueName::new(name.to_string())?;
        self.lock().entry(queue_name.clone()).or_default();
        Ok(queue_name)
    }

    /// Enqueue a message body
    pub fn enqueue(&self, queue: &str, body: impl Into<String>) -> Result<MessageId, QueueError> {
        let message_id = MessageId::new();
        {
            let mut queues = self.lock();
            let stored = queues
                .iter_mut()
                .find(|(name, _)| name.as_str() == queue)
                .map(|(_, q)| q)
                .ok_or_else(|| QueueError::QueueNotFound {
                    queue_name: queue.to_string(),
                })?;

            stored.messages.push(StoredMessage {
                message_id: message_id.clone(),
                body: body.into(),
                delivery_count: 0,
                receipt: None,
                visible_at: Instant::now(),
            });
        }

        self.arrivals.notify_waiters();
        Ok(message_id)
    }

    /// Make every in-flight message of the queue visible again immediately
    pub fn expire_visibility(&self, queue: &str) {
        let now = Instant::now();
        if let Some((_, stored)) = self.lock().iter_mut().find(|(n, _)| n.as_str() == queue) {
            for message in stored.messages.iter_mut() {
                message.visible_at = now;
            }
        }
        self.arrivals.notify_waiters();
    }

    /// Messages still stored (visible or in flight)
    pub fn message_count(&self, queue: &str) -> usize {
        self.lock()
            .iter()
            .find(|(n, _)| n.as_str() == queue)
            .map(|(_, q)| q.messages.len())
            .unwrap_or(0)
    }

    /// Messages deleted so far
    pub fn deleted_count(&self, queue: &str) -> usize {
        self.lock()
            .iter()
            .find(|(n, _)| n.as_str() == queue)
            .map(|(_, q)| q.deleted)
            .unwrap_or(0)
    }

    /// Fail the next `count` receive calls with a connection error
    pub fn fail_next_receives(&self, count: u32) {
        self.failing_receives.store(count, Ordering::SeqCst);
    }

    /// Fail every delete call while enabled
    pub fn set_fail_deletes(&self, fail: bool) {
        self.failing_deletes.store(fail, Ordering::SeqCst);
    }

    /// Delay address resolution (for concurrency tests)
    pub fn set_resolve_delay(&self, delay: Option<Duration>) {
        *self
            .resolve_delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = delay;
    }

    /// Number of address resolutions performed
    pub fn resolve_calls(&self) -> usize {
        self.calls.resolve.load(Ordering::SeqCst)
    }

    /// Number of receive calls performed
    pub fn receive_calls(&self) -> usize {
        self.calls.receive.load(Ordering::SeqCst)
    }

    /// Number of single and batch delete calls performed
    pub fn delete_calls(&self) -> usize {
        self.calls.delete.load(Ordering::SeqCst) + self.calls.delete_batch.load(Ordering::SeqCst)
    }

    fn queue_name_from_url(url: &str) -> Result<QueueName, QueueError> {
        let name = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: url.to_string(),
            })?;
        Ok(QueueName::new(name.to_string())?)
    }

    /// Take up to `max` visible messages, marking them in flight
    fn take_visible(&self, queue: &QueueName, max: usize) -> Result<Vec<ReceivedMessage>, QueueError> {
        let now = Instant::now();
        let visibility = self.config.visibility_timeout;
        let mut queues = self.lock();
        let stored = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            })?;

        let mut received = Vec::new();
        for message in stored.messages.iter_mut() {
            if received.len() >= max {
                break;
            }
            if message.visible_at > now {
                continue;
            }

            let receipt = uuid::Uuid::new_v4().to_string();
            message.delivery_count += 1;
            message.receipt = Some(receipt.clone());
            message.visible_at = now + visibility;

            received.push(ReceivedMessage::new(
                message.message_id.clone(),
                message.body.clone(),
                None,
                ReceiptHandle::new(receipt),
                message.delivery_count,
            ));
        }

        Ok(received)
    }

    fn remove_by_receipt(&self, queue: &QueueName, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let mut queues = self.lock();
        let stored = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            })?;

        let position = stored
            .messages
            .iter()
            .position(|m| m.receipt.as_deref() == Some(receipt.handle()))
            .ok_or_else(|| QueueError::MessageNotFound {
                receipt: receipt.handle().to_string(),
            })?;

        stored.messages.remove(position);
        stored.deleted += 1;
        Ok(())
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn resolve_queue_url(&self, queue: &QueueName) -> Result<String, QueueError> {
        self.calls.resolve.fetch_add(1, Ordering::SeqCst);

        let delay = *self
            .resolve_delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.lock().contains_key(queue) {
            Ok(format!("{}{}", URL_SCHEME, queue))
        } else {
            Err(QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            })
        }
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: u32,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.calls.receive.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failing_receives
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(QueueError::ConnectionFailed {
                message: "injected receive failure".to_string(),
            });
        }

        let queue = Self::queue_name_from_url(queue_url)?;
        let max = max_messages.min(ProviderType::InMemory.max_batch_size()) as usize;
        let deadline = Instant::now() + wait_time;

        loop {
            // Register interest before checking so an enqueue in between is not missed
            let arrival = self.arrivals.notified();

            let messages = self.take_visible(&queue, max)?;
            if !messages.is_empty() || Instant::now() >= deadline {
                return Ok(messages);
            }

            if tokio::time::timeout_at(deadline, arrival).await.is_err() {
                return self.take_visible(&queue, max);
            }
        }
    }

    async fn delete_message(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);

        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(QueueError::ConnectionFailed {
                message: "injected delete failure".to_string(),
            });
        }

        let queue = Self::queue_name_from_url(queue_url)?;
        self.remove_by_receipt(&queue, receipt)
    }

    async fn delete_message_batch(
        &self,
        queue_url: &str,
        entries: &[DeleteEntry],
    ) -> Result<Vec<DeleteFailure>, QueueError> {
        self.calls.delete_batch.fetch_add(1, Ordering::SeqCst);

        let max_size = ProviderType::InMemory.max_batch_size() as usize;
        if entries.len() > max_size {
            return Err(QueueError::BatchTooLarge {
                size: entries.len(),
                max_size,
            });
        }

        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(QueueError::ConnectionFailed {
                message: "injected delete failure".to_string(),
            });
        }

        let queue = Self::queue_name_from_url(queue_url)?;
        let failures = entries
            .iter()
            .filter_map(|entry| {
                self.remove_by_receipt(&queue, &entry.receipt_handle)
                    .err()
                    .map(|e| DeleteFailure {
                        id: entry.id.clone(),
                        code: "ReceiptHandleIsInvalid".to_string(),
                        message: e.to_string(),
                    })
            })
            .collect();

        Ok(failures)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}

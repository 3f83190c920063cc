//! Lazy, cancellable message stream over a [`QueueClient`].
//!
//! Each call to [`MessageStream::next`] drives the polling loop only as far as
//! needed to produce the next message:
//!
//! 1. While the current batch has messages, skip duplicates, mark the rest as
//!    seen and yield them one at a time.
//! 2. Once the batch is drained, await the delete that was started for it.
//! 3. Stop if shutdown was requested; otherwise receive the next batch.
//! 4. An empty receive is followed by the empty-poll cool-down.
//! 5. A non-empty batch gets its delete spawned before its first message is
//!    yielded. Delete failures are logged and never hold back delivery.
//!
//! Both the receive and the cool-down are raced against the shutdown signal.

use crate::client::QueueClient;
use crate::message::ReceivedMessage;
use crate::shutdown::ShutdownSignal;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;

/// Pull-based sequence of messages from one queue
///
/// Produces messages until shutdown is requested, then returns `None` for
/// every subsequent call.
pub struct MessageStream {
    client: Arc<QueueClient>,
    shutdown: ShutdownSignal,
    pending: VecDeque<ReceivedMessage>,
    in_flight_delete: Option<JoinHandle<bool>>,
    finished: bool,
}

impl MessageStream {
    pub(crate) fn new(client: Arc<QueueClient>, shutdown: ShutdownSignal) -> Self {
        Self {
            client,
            shutdown,
            pending: VecDeque::new(),
            in_flight_delete: None,
            finished: false,
        }
    }

    /// Next message not seen within the dedup window, or `None` after shutdown
    pub async fn next(&mut self) -> Option<ReceivedMessage> {
        loop {
            while let Some(message) = self.pending.pop_front() {
                if self.client.is_duplicate(&message).await {
                    debug!(
                        queue = %self.client.queue_name(),
                        message_id = %message.message_id,
                        content_hash = %message.content_hash,
                        "Skipping duplicate message"
                    );
                    continue;
                }

                self.client.cache_seen(&message).await;
                return Some(message);
            }

            self.finish_pending_delete().await;

            if self.finished {
                return None;
            }
            if self.shutdown.is_cancelled() {
                return self.stop();
            }

            let batch = {
                let client = &self.client;
                let shutdown = &mut self.shutdown;
                tokio::select! {
                    batch = client.read_messages() => batch,
                    _ = shutdown.cancelled() => Vec::new(),
                }
            };

            if self.shutdown.is_cancelled() && batch.is_empty() {
                return self.stop();
            }

            if batch.is_empty() {
                let delay = self.client.settings().empty_poll_delay;
                debug!(
                    queue = %self.client.queue_name(),
                    delay_secs = delay.as_secs(),
                    "Queue empty, cooling down before next poll"
                );

                let shutdown = &mut self.shutdown;
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.cancelled() => {}
                }
                continue;
            }

            let client = Arc::clone(&self.client);
            let to_delete = batch.clone();
            self.in_flight_delete = Some(tokio::spawn(async move {
                client.delete_messages(&to_delete).await
            }));
            self.pending.extend(batch);
        }
    }

    /// Whether the stream has observed shutdown and stopped producing
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn stop(&mut self) -> Option<ReceivedMessage> {
        if !self.finished {
            info!(
                queue = %self.client.queue_name(),
                "Shutdown requested, message stream stopping"
            );
            self.finished = true;
        }
        None
    }

    async fn finish_pending_delete(&mut self) {
        let Some(handle) = self.in_flight_delete.take() else {
            return;
        };

        match handle.await {
            Ok(true) => {}
            Ok(false) => debug!(
                queue = %self.client.queue_name(),
                "Batch delete did not complete cleanly; messages may be redelivered"
            ),
            Err(e) => warn!(
                queue = %self.client.queue_name(),
                error = %e,
                "Batch delete task failed"
            ),
        }
    }
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("queue", self.client.queue_name())
            .field("pending", &self.pending.len())
            .field("delete_in_flight", &self.in_flight_delete.is_some())
            .field("finished", &self.finished)
            .finish()
    }
}

//! Common test utilities for member events integration tests
//!
//! This module provides:
//! - A recording member service and scope factory
//! - A pipeline builder wiring the in-memory transport, registry and consumer
//! - Polling helpers for paused-clock tests

use async_trait::async_trait;
use member_events_worker::{
    ConsumerOutcome, ConsumerSettings, EventConsumer, IdempotencyCache, MemberService,
    RetryPolicy, ServiceScope, ServiceScopeFactory,
};
use member_queue::{
    shutdown_channel, DedupCache, InMemoryTransport, QueueClientRegistry, ReceiveSettings,
    ShutdownController,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const QUEUE: &str = "member-created";

// ============================================================================
// Recording member service
// ============================================================================

/// Member service that records calls and can fail on demand
#[derive(Clone, Default)]
pub struct RecordingMemberService {
    calls: Arc<Mutex<Vec<i64>>>,
    failures: Arc<AtomicU32>,
}

impl RecordingMemberService {
    /// Fail the next `count` sends
    #[allow(dead_code)]
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<i64> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MemberService for RecordingMemberService {
    async fn send_signup_verification_email(&self, member_id: i64) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(member_id);

        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("downstream unavailable");
        }
        Ok(())
    }
}

struct RecordingScope {
    service: RecordingMemberService,
}

impl ServiceScope for RecordingScope {
    fn member_service(&self) -> &dyn MemberService {
        &self.service
    }
}

/// Hands out scopes sharing one recording service
#[derive(Clone, Default)]
pub struct RecordingScopeFactory {
    pub service: RecordingMemberService,
}

impl ServiceScopeFactory for RecordingScopeFactory {
    fn create_scope(&self) -> anyhow::Result<Box<dyn ServiceScope>> {
        Ok(Box::new(RecordingScope {
            service: self.service.clone(),
        }))
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// In-memory transport, registry and consumer wired together
pub struct Pipeline {
    pub transport: InMemoryTransport,
    pub registry: Arc<QueueClientRegistry>,
    pub service: RecordingMemberService,
    pub idempotency: IdempotencyCache,
    pub send_verification_email: bool,
    pub queue_name: Option<String>,
}

impl Pipeline {
    /// Pipeline over an existing queue with default caches
    pub fn new() -> Self {
        Self::with_dedup(DedupCache::default())
    }

    /// Pipeline whose registry uses the given dedup cache
    pub fn with_dedup(dedup: DedupCache) -> Self {
        let transport = InMemoryTransport::default();
        transport.create_queue(QUEUE).unwrap();

        let registry = Arc::new(QueueClientRegistry::new(
            Arc::new(transport.clone()),
            dedup,
            ReceiveSettings {
                max_messages: 10,
                wait_time: Duration::from_secs(20),
                empty_poll_delay: Duration::from_secs(180),
            },
        ));

        Self {
            transport,
            registry,
            service: RecordingMemberService::default(),
            idempotency: IdempotencyCache::default(),
            send_verification_email: true,
            queue_name: Some(QUEUE.to_string()),
        }
    }

    pub fn enqueue(&self, body: &str) {
        self.transport.enqueue(QUEUE, body).unwrap();
    }

    /// Build a consumer over this pipeline's shared state
    pub fn consumer(&self) -> EventConsumer {
        EventConsumer::new(
            ConsumerSettings {
                queue_name: self.queue_name.clone(),
                send_verification_email: self.send_verification_email,
            },
            Arc::clone(&self.registry),
            Arc::new(RecordingScopeFactory {
                service: self.service.clone(),
            }),
            self.idempotency.clone(),
            RetryPolicy::immediate(3),
        )
    }

    /// Spawn a consumer, returning its task and the controller that stops it
    pub fn start(&self) -> (JoinHandle<ConsumerOutcome>, ShutdownController) {
        let consumer = self.consumer();
        let (controller, signal) = shutdown_channel();
        let task = tokio::spawn(async move { consumer.run(signal).await });
        (task, controller)
    }
}

/// Poll `condition` every 10 ms of (possibly paused) time until it holds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Request shutdown and collect the consumer's outcome
pub async fn stop(
    task: JoinHandle<ConsumerOutcome>,
    controller: ShutdownController,
) -> ConsumerOutcome {
    controller.shutdown();
    task.await.expect("consumer task panicked")
}

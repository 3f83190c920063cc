//! Tests for the queue client registry.

use super::*;
use crate::providers::memory::InMemoryTransport;
use std::time::Duration;

fn registry_with(transport: &InMemoryTransport) -> QueueClientRegistry {
    QueueClientRegistry::new(
        Arc::new(transport.clone()),
        DedupCache::default(),
        ReceiveSettings::default(),
    )
}

#[tokio::test]
async fn test_first_request_creates_initialised_client() {
    let transport = InMemoryTransport::default();
    transport.create_queue("member-created").unwrap();
    let registry = registry_with(&transport);

    assert!(registry.is_empty().await);

    let client = registry.get_or_create("member-created").await.unwrap();

    assert_eq!(client.queue_name().as_str(), "member-created");
    assert_eq!(client.queue_url(), Some("memory://member-created"));
    assert!(registry.contains("member-created").await);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_repeated_requests_return_same_instance() {
    let transport = InMemoryTransport::default();
    transport.create_queue("member-created").unwrap();
    let registry = registry_with(&transport);

    let first = registry.get_or_create("member-created").await.unwrap();
    let second = registry.get_or_create("member-created").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(transport.resolve_calls(), 1);
}

#[tokio::test]
async fn test_surrounding_whitespace_is_ignored() {
    let transport = InMemoryTransport::default();
    transport.create_queue("member-created").unwrap();
    let registry = registry_with(&transport);

    let padded = registry.get_or_create("  member-created ").await.unwrap();
    let plain = registry.get_or_create("member-created").await.unwrap();

    assert!(Arc::ptr_eq(&padded, &plain));
}

#[tokio::test]
async fn test_distinct_names_get_distinct_clients() {
    let transport = InMemoryTransport::default();
    transport.create_queue("member-created").unwrap();
    transport.create_queue("member-deleted").unwrap();
    let registry = registry_with(&transport);

    let created = registry.get_or_create("member-created").await.unwrap();
    let deleted = registry.get_or_create("member-deleted").await.unwrap();

    assert!(!Arc::ptr_eq(&created, &deleted));
    assert_eq!(registry.len().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_initialise_once() {
    let transport = InMemoryTransport::default();
    transport.create_queue("member-created").unwrap();
    transport.set_resolve_delay(Some(Duration::from_millis(500)));
    let registry = Arc::new(registry_with(&transport));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_or_create("member-created").await })
        })
        .collect();

    let mut clients = Vec::new();
    for handle in handles {
        clients.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(transport.resolve_calls(), 1);
    assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_missing_queue_fails_and_is_not_cached() {
    let transport = InMemoryTransport::default();
    let registry = registry_with(&transport);

    let result = registry.get_or_create("member-created").await;

    assert!(matches!(result, Err(QueueError::QueueNotFound { .. })));
    assert!(!registry.contains("member-created").await);
    assert!(registry.is_empty().await);

    transport.create_queue("member-created").unwrap();
    let retried = registry.get_or_create("member-created").await;

    assert!(retried.is_ok());
    assert_eq!(transport.resolve_calls(), 2);
}

#[tokio::test]
async fn test_invalid_name_is_rejected_without_resolving() {
    let transport = InMemoryTransport::default();
    let registry = registry_with(&transport);

    for name in ["", "   ", "has spaces", "bad/name"] {
        let result = registry.get_or_create(name).await;
        assert!(
            matches!(result, Err(QueueError::ValidationError(_))),
            "expected validation error for {:?}",
            name
        );
    }

    assert_eq!(transport.resolve_calls(), 0);
}

#[tokio::test]
async fn test_clients_share_the_registry_dedup_cache() {
    let transport = InMemoryTransport::default();
    transport.create_queue("member-created").unwrap();
    let registry = registry_with(&transport);
    let client = registry.get_or_create("member-created").await.unwrap();
    transport.enqueue("member-created", "body").unwrap();
    let message = client.read_messages().await.remove(0);

    client.cache_seen(&message).await;

    assert!(
        registry
            .dedup_cache()
            .contains(client.queue_name(), &message.content_hash)
            .await
    );
}

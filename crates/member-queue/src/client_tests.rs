//! Tests for the per-queue client.

use super::*;
use crate::providers::memory::InMemoryTransport;

const QUEUE: &str = "member-created";

fn quick_settings() -> ReceiveSettings {
    ReceiveSettings {
        max_messages: 10,
        wait_time: Duration::ZERO,
        empty_poll_delay: Duration::from_secs(180),
    }
}

fn client_for(transport: &InMemoryTransport) -> QueueClient {
    transport.create_queue(QUEUE).unwrap();
    QueueClient::new(
        QueueName::new(QUEUE.to_string()).unwrap(),
        Arc::new(transport.clone()),
        DedupCache::default(),
        quick_settings(),
    )
}

mod initialise {
    use super::*;

    #[tokio::test]
    async fn test_initialise_resolves_and_caches_address() {
        let transport = InMemoryTransport::default();
        let client = client_for(&transport);

        assert!(client.queue_url().is_none());

        let url = client.initialise().await.unwrap().to_string();
        client.initialise().await.unwrap();

        assert_eq!(url, "memory://member-created");
        assert_eq!(client.queue_url(), Some("memory://member-created"));
        assert_eq!(transport.resolve_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_initialise_is_retried() {
        let transport = InMemoryTransport::default();
        let client = QueueClient::new(
            QueueName::new("not-yet-created".to_string()).unwrap(),
            Arc::new(transport.clone()),
            DedupCache::default(),
            quick_settings(),
        );

        assert!(matches!(
            client.initialise().await,
            Err(QueueError::QueueNotFound { .. })
        ));

        transport.create_queue("not-yet-created").unwrap();

        assert!(client.initialise().await.is_ok());
        assert_eq!(transport.resolve_calls(), 2);
    }
}

mod read_messages {
    use super::*;

    #[tokio::test]
    async fn test_read_before_initialise_returns_empty() {
        let transport = InMemoryTransport::default();
        let client = client_for(&transport);
        transport.enqueue(QUEUE, "body").unwrap();

        let batch = client.read_messages().await;

        assert!(batch.is_empty());
        assert_eq!(transport.receive_calls(), 0);
    }

    #[tokio::test]
    async fn test_read_returns_available_messages() {
        let transport = InMemoryTransport::default();
        let client = client_for(&transport);
        client.initialise().await.unwrap();
        transport.enqueue(QUEUE, "a").unwrap();
        transport.enqueue(QUEUE, "b").unwrap();

        let batch = client.read_messages().await;

        let bodies: Vec<_> = batch.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_read_clamps_batch_to_configured_maximum() {
        let transport = InMemoryTransport::default();
        transport.create_queue(QUEUE).unwrap();
        let client = QueueClient::new(
            QueueName::new(QUEUE.to_string()).unwrap(),
            Arc::new(transport.clone()),
            DedupCache::default(),
            ReceiveSettings {
                max_messages: 2,
                ..quick_settings()
            },
        );
        client.initialise().await.unwrap();
        for i in 0..5 {
            transport.enqueue(QUEUE, format!("m{}", i)).unwrap();
        }

        assert_eq!(client.read_messages().await.len(), 2);
    }

    #[tokio::test]
    async fn test_receive_failure_is_swallowed() {
        let transport = InMemoryTransport::default();
        let client = client_for(&transport);
        client.initialise().await.unwrap();
        transport.enqueue(QUEUE, "body").unwrap();
        transport.fail_next_receives(1);

        assert!(client.read_messages().await.is_empty());
        assert_eq!(client.read_messages().await.len(), 1);
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn test_delete_message_removes_it() {
        let transport = InMemoryTransport::default();
        let client = client_for(&transport);
        client.initialise().await.unwrap();
        transport.enqueue(QUEUE, "body").unwrap();
        let batch = client.read_messages().await;

        assert!(client.delete_message(&batch[0]).await);
        assert_eq!(transport.message_count(QUEUE), 0);
    }

    #[tokio::test]
    async fn test_delete_with_stale_receipt_returns_false() {
        let transport = InMemoryTransport::default();
        let client = client_for(&transport);
        client.initialise().await.unwrap();
        transport.enqueue(QUEUE, "body").unwrap();
        let stale = client.read_messages().await;
        transport.expire_visibility(QUEUE);
        let _fresh = client.read_messages().await;

        assert!(!client.delete_message(&stale[0]).await);
        assert_eq!(transport.message_count(QUEUE), 1);
    }

    #[tokio::test]
    async fn test_delete_messages_empty_batch_is_noop() {
        let transport = InMemoryTransport::default();
        let client = client_for(&transport);
        client.initialise().await.unwrap();

        assert!(client.delete_messages(&[]).await);
        assert_eq!(transport.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_delete_messages_removes_whole_batch() {
        let transport = InMemoryTransport::default();
        let client = client_for(&transport);
        client.initialise().await.unwrap();
        for i in 0..3 {
            transport.enqueue(QUEUE, format!("m{}", i)).unwrap();
        }
        let batch = client.read_messages().await;

        assert!(client.delete_messages(&batch).await);
        assert_eq!(transport.message_count(QUEUE), 0);
        assert_eq!(transport.deleted_count(QUEUE), 3);
    }

    #[tokio::test]
    async fn test_delete_messages_reports_transport_failure() {
        let transport = InMemoryTransport::default();
        let client = client_for(&transport);
        client.initialise().await.unwrap();
        transport.enqueue(QUEUE, "body").unwrap();
        let batch = client.read_messages().await;
        transport.set_fail_deletes(true);

        assert!(!client.delete_messages(&batch).await);
        assert_eq!(transport.message_count(QUEUE), 1);
    }

    #[tokio::test]
    async fn test_delete_before_initialise_returns_false() {
        let transport = InMemoryTransport::default();
        let client = client_for(&transport);
        let message = ReceivedMessage::new(
            crate::message::MessageId::new(),
            "body".to_string(),
            None,
            ReceiptHandle::new("receipt".to_string()),
            1,
        );

        assert!(!client.delete_message(&message).await);
        assert!(!client.delete_messages(&[message]).await);
    }
}

mod dedup {
    use super::*;

    fn message(body: &str) -> ReceivedMessage {
        ReceivedMessage::new(
            crate::message::MessageId::new(),
            body.to_string(),
            None,
            ReceiptHandle::new(uuid::Uuid::new_v4().to_string()),
            1,
        )
    }

    #[tokio::test]
    async fn test_cache_seen_marks_content_as_duplicate() {
        let transport = InMemoryTransport::default();
        let client = client_for(&transport);
        let first = message(r#"{"memberId":101}"#);
        let same_content = message(r#"{"memberId":101}"#);

        assert!(!client.is_duplicate(&first).await);

        client.cache_seen(&first).await;

        assert!(client.is_duplicate(&same_content).await);
        assert!(!client.is_duplicate(&message(r#"{"memberId":102}"#)).await);
    }
}

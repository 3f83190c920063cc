//! Tests for in-memory queue transport.

use super::*;

const QUEUE: &str = "member-created";

fn transport_with_queue() -> (InMemoryTransport, QueueName) {
    let transport = InMemoryTransport::default();
    let name = transport.create_queue(QUEUE).unwrap();
    (transport, name)
}

mod resolution {
    use super::*;

    #[tokio::test]
    async fn test_resolve_existing_queue() {
        let (transport, name) = transport_with_queue();

        let url = transport.resolve_queue_url(&name).await.unwrap();

        assert_eq!(url, "memory://member-created");
        assert_eq!(transport.resolve_calls(), 1);
    }

    #[tokio::test]
    async fn test_resolve_unknown_queue_fails() {
        let transport = InMemoryTransport::default();
        let name = QueueName::new("missing".to_string()).unwrap();

        let result = transport.resolve_queue_url(&name).await;

        match result {
            Err(QueueError::QueueNotFound { queue_name }) => assert_eq!(queue_name, "missing"),
            other => panic!("Expected QueueNotFound, got: {:?}", other),
        }
    }

    #[test]
    fn test_enqueue_to_unknown_queue_fails() {
        let transport = InMemoryTransport::default();
        assert!(transport.enqueue("missing", "body").is_err());
    }
}

mod receive_and_delete {
    use super::*;

    #[tokio::test]
    async fn test_receive_returns_enqueued_messages_up_to_max() {
        let (transport, name) = transport_with_queue();
        for i in 0..3 {
            transport.enqueue(QUEUE, format!("body-{}", i)).unwrap();
        }
        let url = transport.resolve_queue_url(&name).await.unwrap();

        let batch = transport
            .receive_messages(&url, 2, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].body, "body-0");
        assert_eq!(batch[0].delivery_count, 1);
        assert_eq!(batch[0].content_hash, crate::message::content_hash_of("body-0"));
    }

    #[tokio::test]
    async fn test_received_messages_are_hidden_until_visibility_expires() {
        let (transport, name) = transport_with_queue();
        transport.enqueue(QUEUE, "body").unwrap();
        let url = transport.resolve_queue_url(&name).await.unwrap();

        let first = transport.receive_messages(&url, 10, Duration::ZERO).await.unwrap();
        let hidden = transport.receive_messages(&url, 10, Duration::ZERO).await.unwrap();
        transport.expire_visibility(QUEUE);
        let redelivered = transport.receive_messages(&url, 10, Duration::ZERO).await.unwrap();

        assert_eq!(first.len(), 1);
        assert!(hidden.is_empty());
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].delivery_count, 2);
        assert_eq!(redelivered[0].content_hash, first[0].content_hash);
        assert_ne!(redelivered[0].receipt_handle, first[0].receipt_handle);
    }

    #[tokio::test]
    async fn test_delete_removes_message() {
        let (transport, name) = transport_with_queue();
        transport.enqueue(QUEUE, "body").unwrap();
        let url = transport.resolve_queue_url(&name).await.unwrap();
        let batch = transport.receive_messages(&url, 10, Duration::ZERO).await.unwrap();

        transport
            .delete_message(&url, &batch[0].receipt_handle)
            .await
            .unwrap();

        assert_eq!(transport.message_count(QUEUE), 0);
        assert_eq!(transport.deleted_count(QUEUE), 1);
    }

    #[tokio::test]
    async fn test_delete_with_stale_receipt_fails() {
        let (transport, name) = transport_with_queue();
        transport.enqueue(QUEUE, "body").unwrap();
        let url = transport.resolve_queue_url(&name).await.unwrap();
        let first = transport.receive_messages(&url, 10, Duration::ZERO).await.unwrap();
        transport.expire_visibility(QUEUE);
        let _second = transport.receive_messages(&url, 10, Duration::ZERO).await.unwrap();

        let result = transport.delete_message(&url, &first[0].receipt_handle).await;

        assert!(matches!(result, Err(QueueError::MessageNotFound { .. })));
    }

    #[tokio::test]
    async fn test_batch_delete_reports_failed_entries() {
        let (transport, name) = transport_with_queue();
        transport.enqueue(QUEUE, "body").unwrap();
        let url = transport.resolve_queue_url(&name).await.unwrap();
        let batch = transport.receive_messages(&url, 10, Duration::ZERO).await.unwrap();

        let entries = vec![
            DeleteEntry {
                id: "msg-0".to_string(),
                receipt_handle: batch[0].receipt_handle.clone(),
            },
            DeleteEntry {
                id: "msg-1".to_string(),
                receipt_handle: ReceiptHandle::new("unknown".to_string()),
            },
        ];

        let failures = transport.delete_message_batch(&url, &entries).await.unwrap();

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].id, "msg-1");
        assert_eq!(transport.deleted_count(QUEUE), 1);
    }
}

mod long_polling {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_receive_waits_for_arrival() {
        let (transport, name) = transport_with_queue();
        let url = transport.resolve_queue_url(&name).await.unwrap();

        let producer = transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            producer.enqueue(QUEUE, "late").unwrap();
        });

        let started = Instant::now();
        let batch = transport
            .receive_messages(&url, 10, Duration::from_secs(20))
            .await
            .unwrap();

        assert_eq!(batch.len(), 1);
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_returns_empty_after_wait() {
        let (transport, name) = transport_with_queue();
        let url = transport.resolve_queue_url(&name).await.unwrap();

        let started = Instant::now();
        let batch = transport
            .receive_messages(&url, 10, Duration::from_secs(20))
            .await
            .unwrap();

        assert!(batch.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(20));
    }
}

mod failure_injection {
    use super::*;

    #[tokio::test]
    async fn test_failing_receives_then_recovers() {
        let (transport, name) = transport_with_queue();
        transport.enqueue(QUEUE, "body").unwrap();
        let url = transport.resolve_queue_url(&name).await.unwrap();
        transport.fail_next_receives(1);

        let failed = transport.receive_messages(&url, 10, Duration::ZERO).await;
        let recovered = transport.receive_messages(&url, 10, Duration::ZERO).await;

        assert!(matches!(failed, Err(QueueError::ConnectionFailed { .. })));
        assert_eq!(recovered.unwrap().len(), 1);
        assert_eq!(transport.receive_calls(), 2);
    }

    #[tokio::test]
    async fn test_failing_deletes() {
        let (transport, name) = transport_with_queue();
        transport.enqueue(QUEUE, "body").unwrap();
        let url = transport.resolve_queue_url(&name).await.unwrap();
        let batch = transport.receive_messages(&url, 10, Duration::ZERO).await.unwrap();
        transport.set_fail_deletes(true);

        let result = transport.delete_message(&url, &batch[0].receipt_handle).await;

        assert!(result.is_err());
        assert_eq!(transport.message_count(QUEUE), 1);
        assert_eq!(transport.delete_calls(), 1);
    }
}

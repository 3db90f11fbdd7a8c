//! Storage contract tests
//!
//! Every test runs against each backend.

use super::*;
use serde_json::json;
use tempfile::TempDir;

use crate::error::AppError;

struct Backend {
    name: &'static str,
    storage: Box<dyn Storage>,
    _temp_dir: Option<TempDir>,
}

/// Helper to create a test SQLite database
async fn create_test_db(scan_limit: usize) -> (SqliteStorage, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = SqliteStorage::connect(&db_path, scan_limit).await.unwrap();
    (db, temp_dir)
}

async fn backends_with_limit(scan_limit: usize) -> Vec<Backend> {
    let (sqlite, temp_dir) = create_test_db(scan_limit).await;
    vec![
        Backend {
            name: "sqlite",
            storage: Box::new(sqlite),
            _temp_dir: Some(temp_dir),
        },
        Backend {
            name: "memory",
            storage: Box::new(MemoryStorage::new(scan_limit)),
            _temp_dir: None,
        },
    ]
}

async fn backends() -> Vec<Backend> {
    backends_with_limit(10_000).await
}

fn message(sender: &str, receivers: &[&str], content: serde_json::Value) -> Message {
    Message {
        sender: sender.to_string(),
        receivers: receivers.iter().map(|r| r.to_string()).collect(),
        content: content.as_object().cloned().unwrap(),
    }
}

// =============================================================================
// Mailbox
// =============================================================================

#[tokio::test]
async fn test_send_fans_out_to_every_receiver() {
    for backend in backends().await {
        let storage = &backend.storage;
        let outcome = storage
            .send(&message("alice", &["bob", "carol"], json!({"text": "hi"})))
            .await
            .unwrap();

        assert_eq!(outcome.delivered, 2, "{}", backend.name);
        assert!(outcome.failed.is_empty(), "{}", backend.name);

        for receiver in ["bob", "carol"] {
            let entries = storage.read(receiver, false).await.unwrap();
            assert_eq!(entries.len(), 1, "{}", backend.name);
            assert_eq!(entries[0].id, outcome.message_id);
            assert_eq!(entries[0].sender, "alice");
            assert_eq!(entries[0].content["text"], "hi");
            assert!(!entries[0].read);
        }

        assert!(storage.read("dave", false).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_read_filters_unread() {
    for backend in backends().await {
        let storage = &backend.storage;
        let first = storage
            .send(&message("alice", &["bob"], json!({"n": 1})))
            .await
            .unwrap();
        let second = storage
            .send(&message("alice", &["bob"], json!({"n": 2})))
            .await
            .unwrap();

        storage.set("bob", first.message_id, true).await.unwrap();

        let unread = storage.read("bob", true).await.unwrap();
        assert_eq!(unread.len(), 1, "{}", backend.name);
        assert_eq!(unread[0].id, second.message_id);

        let all = storage.read("bob", false).await.unwrap();
        assert_eq!(all.len(), 2, "{}", backend.name);
    }
}

#[tokio::test]
async fn test_set_is_idempotent() {
    for backend in backends().await {
        let storage = &backend.storage;
        let sent = storage
            .send(&message("alice", &["bob"], json!({"text": "hi"})))
            .await
            .unwrap();

        storage.set("bob", sent.message_id, true).await.unwrap();
        storage.set("bob", sent.message_id, true).await.unwrap();

        let entries = storage.read("bob", false).await.unwrap();
        assert!(entries[0].read, "{}", backend.name);
        assert_eq!(storage.count_unread("bob").await.unwrap(), 0);

        storage.set("bob", sent.message_id, false).await.unwrap();
        assert_eq!(storage.count_unread("bob").await.unwrap(), 1);
    }
}

#[tokio::test]
async fn test_set_and_delete_missing_entry_is_not_found() {
    for backend in backends().await {
        let storage = &backend.storage;
        let sent = storage
            .send(&message("alice", &["bob"], json!({"text": "hi"})))
            .await
            .unwrap();

        assert!(
            matches!(
                storage.set("carol", sent.message_id, true).await,
                Err(AppError::NotFound)
            ),
            "{}",
            backend.name
        );
        assert!(matches!(
            storage.delete("bob", sent.message_id + 100).await,
            Err(AppError::NotFound)
        ));
    }
}

#[tokio::test]
async fn test_count_unread_after_n_sends() {
    for backend in backends().await {
        let storage = &backend.storage;
        for n in 0..5 {
            storage
                .send(&message("alice", &["bob"], json!({ "n": n })))
                .await
                .unwrap();
        }
        assert_eq!(storage.count_unread("bob").await.unwrap(), 5, "{}", backend.name);
        assert_eq!(storage.count_unread("carol").await.unwrap(), 0);
    }
}

#[tokio::test]
async fn test_count_unread_saturates_at_scan_limit() {
    for backend in backends_with_limit(3).await {
        let storage = &backend.storage;
        for n in 0..5 {
            storage
                .send(&message("alice", &["bob"], json!({ "n": n })))
                .await
                .unwrap();
        }
        assert_eq!(storage.count_unread("bob").await.unwrap(), 3, "{}", backend.name);
        assert_eq!(storage.read("bob", false).await.unwrap().len(), 3);
    }
}

#[tokio::test]
async fn test_delete_keeps_message_for_other_receivers() {
    for backend in backends().await {
        let storage = &backend.storage;
        let sent = storage
            .send(&message("alice", &["bob", "carol"], json!({"text": "hi"})))
            .await
            .unwrap();

        storage.delete("bob", sent.message_id).await.unwrap();

        assert!(storage.read("bob", false).await.unwrap().is_empty(), "{}", backend.name);
        let carol = storage.read("carol", false).await.unwrap();
        assert_eq!(carol.len(), 1, "{}", backend.name);
        assert_eq!(carol[0].content["text"], "hi");
    }
}

#[tokio::test]
async fn test_message_ids_are_monotonic() {
    for backend in backends().await {
        let storage = &backend.storage;
        let first = storage
            .send(&message("alice", &["bob"], json!({"n": 1})))
            .await
            .unwrap();
        storage.delete("bob", first.message_id).await.unwrap();
        let second = storage
            .send(&message("alice", &["bob"], json!({"n": 2})))
            .await
            .unwrap();

        assert!(second.message_id > first.message_id, "{}", backend.name);
    }
}

#[tokio::test]
async fn test_sqlite_partial_fan_out_is_reported() {
    let (db, _temp_dir) = create_test_db(10_000).await;

    sqlx::query(
        "CREATE TRIGGER reject_mallory BEFORE INSERT ON receivers \
         WHEN NEW.receiver = 'mallory' \
         BEGIN SELECT RAISE(ABORT, 'mailbox closed'); END",
    )
    .execute(db.pool())
    .await
    .unwrap();

    let outcome = db
        .send(&message(
            "alice",
            &["bob", "mallory", "carol"],
            json!({"text": "hi"}),
        ))
        .await
        .unwrap();

    assert_eq!(outcome.delivered, 2);
    assert_eq!(outcome.failed, vec!["mallory".to_string()]);
    assert_eq!(db.read("bob", false).await.unwrap().len(), 1);
    assert_eq!(db.read("carol", false).await.unwrap().len(), 1);
    assert!(db.read("mallory", false).await.unwrap().is_empty());
}

// =============================================================================
// Likes
// =============================================================================

#[tokio::test]
async fn test_likes_are_never_deduplicated() {
    for backend in backends().await {
        let storage = &backend.storage;
        let like = NewLike {
            actor: "http://a.example/person/alice".to_string(),
            object: "http://b.example/economicresource/bike".to_string(),
            summary: Some("nice".to_string()),
        };

        let first = storage.actor_likes(&like).await.unwrap();
        let second = storage.actor_likes(&like).await.unwrap();
        assert_ne!(first, second, "{}", backend.name);
        assert!(second > first);

        for id in [first, second] {
            let record = storage.find_actor_like(id).await.unwrap();
            assert_eq!(record.id, id);
            assert_eq!(record.object, like.object);
            assert_eq!(record.summary.as_deref(), Some("nice"));
        }

        assert_eq!(
            storage.find_actor_likes(&like.actor).await.unwrap(),
            vec![first, second]
        );
        assert!(
            storage
                .find_actor_likes("http://a.example/person/bob")
                .await
                .unwrap()
                .is_empty()
        );
    }
}

#[tokio::test]
async fn test_find_missing_like_is_not_found() {
    for backend in backends().await {
        assert!(
            matches!(
                backend.storage.find_actor_like(42).await,
                Err(AppError::NotFound)
            ),
            "{}",
            backend.name
        );
    }
}

// =============================================================================
// Follows
// =============================================================================

#[tokio::test]
async fn test_store_follower_is_idempotent_per_pair() {
    for backend in backends().await {
        let storage = &backend.storage;

        let first = storage.store_follower("alice", "bob").await.unwrap();
        let second = storage.store_follower("alice", "bob").await.unwrap();

        assert!(first.created, "{}", backend.name);
        assert!(!second.created, "{}", backend.name);
        assert_eq!(first.follow.id, second.follow.id);
        assert!(!second.follow.accepted);

        let other = storage.store_follower("carol", "bob").await.unwrap();
        assert!(other.follow.id > first.follow.id);

        assert_eq!(
            storage.find_actor_follows("bob", true).await.unwrap(),
            vec!["alice".to_string(), "carol".to_string()]
        );
        assert_eq!(
            storage.find_actor_follows("alice", false).await.unwrap(),
            vec!["bob".to_string()]
        );
    }
}

#[tokio::test]
async fn test_accept_follower_only_moves_forward() {
    for backend in backends().await {
        let storage = &backend.storage;
        let stored = storage.store_follower("alice", "bob").await.unwrap();

        let accepted = storage.accept_follower(stored.follow.id).await.unwrap();
        assert!(accepted.accepted, "{}", backend.name);

        // a later Follow for the same pair leaves it accepted
        let again = storage.store_follower("alice", "bob").await.unwrap();
        assert!(again.follow.accepted, "{}", backend.name);
        assert!(storage.accept_follower(stored.follow.id).await.unwrap().accepted);

        assert!(storage.find_follow(stored.follow.id).await.unwrap().accepted);
        assert!(matches!(
            storage.accept_follower(stored.follow.id + 10).await,
            Err(AppError::NotFound)
        ));
    }
}

// =============================================================================
// Delivery ledger
// =============================================================================

#[tokio::test]
async fn test_delivery_ledger_moves_out_of_pending() {
    for backend in backends().await {
        let storage = &backend.storage;
        let payload = json!({"type": "Follow"});

        let ok = storage
            .record_delivery("Follow", "http://peer/person/bob/inbox", &payload)
            .await
            .unwrap();
        let bad = storage
            .record_delivery("Follow", "http://peer/person/eve/inbox", &payload)
            .await
            .unwrap();

        assert_eq!(
            storage
                .find_deliveries(DeliveryStatus::Pending)
                .await
                .unwrap()
                .len(),
            2,
            "{}",
            backend.name
        );

        storage
            .complete_delivery(ok, DeliveryStatus::Delivered, None)
            .await
            .unwrap();
        storage
            .complete_delivery(bad, DeliveryStatus::Failed, Some("HTTP 500".to_string()))
            .await
            .unwrap();

        assert!(
            storage
                .find_deliveries(DeliveryStatus::Pending)
                .await
                .unwrap()
                .is_empty()
        );
        let failed = storage
            .find_deliveries(DeliveryStatus::Failed)
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, bad);
        assert_eq!(failed[0].error.as_deref(), Some("HTTP 500"));
        assert_eq!(failed[0].payload, payload);

        assert!(matches!(
            storage
                .complete_delivery(bad + 10, DeliveryStatus::Delivered, None)
                .await,
            Err(AppError::NotFound)
        ));
    }
}

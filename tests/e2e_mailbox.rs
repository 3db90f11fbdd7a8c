//! E2E tests for the mailbox endpoints

mod common;

use common::{TestServer, key_of};
use serde_json::{Value, json};

async fn json_of(response: reqwest::Response) -> Value {
    response.json().await.unwrap()
}

#[tokio::test]
async fn test_send_read_ack_count_round() {
    let server = TestServer::new().await;

    let response = server
        .post_as(
            "/send",
            "alice",
            &json!({"sender": "alice", "receivers": ["bob", "carol"], "content": {"text": "hi"}}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = json_of(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 2);
    assert_eq!(body["failed"], json!([]));

    let response = server
        .post_as("/read", "bob", &json!({"receiver": "bob", "only_unread": true}))
        .await;
    assert_eq!(response.status(), 200);
    let body = json_of(response).await;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"]["text"], "hi");
    assert_eq!(messages[0]["sender"], "alice");
    assert_eq!(messages[0]["read"], false);
    let message_id = messages[0]["id"].as_i64().unwrap();

    let response = server
        .post_as(
            "/set-read",
            "bob",
            &json!({"receiver": "bob", "messageId": message_id, "read": true}),
        )
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(json_of(response).await["success"], true);

    let response = server
        .post_as("/count-unread", "bob", &json!({"receiver": "bob"}))
        .await;
    let body = json_of(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 0);

    // carol's copy is untouched
    let response = server
        .post_as("/count-unread", "carol", &json!({"receiver": "carol"}))
        .await;
    assert_eq!(json_of(response).await["count"], 1);
}

#[tokio::test]
async fn test_read_echoes_request_id() {
    let server = TestServer::new().await;

    let response = server
        .post_as("/read", "bob", &json!({"request_id": 42, "receiver": "bob"}))
        .await;
    let body = json_of(response).await;
    assert_eq!(body["request_id"], 42);
    assert_eq!(body["messages"], json!([]));
}

#[tokio::test]
async fn test_duplicate_receivers_are_collapsed() {
    let server = TestServer::new().await;

    let response = server
        .post_as(
            "/send",
            "alice",
            &json!({"sender": "alice", "receivers": ["bob", "bob"], "content": {"text": "hi"}}),
        )
        .await;
    assert_eq!(json_of(response).await["count"], 1);

    let response = server
        .post_as("/read", "bob", &json!({"receiver": "bob"}))
        .await;
    assert_eq!(json_of(response).await["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sender_cannot_be_impersonated() {
    let server = TestServer::new().await;

    // carol signs a message claiming to be alice
    let response = server
        .post_signed(
            "/send",
            &key_of("carol"),
            &json!({"sender": "alice", "receivers": ["bob"], "content": {"text": "hi"}}),
        )
        .await;
    assert_eq!(response.status(), 401);
    let body = json_of(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid signature");

    assert_eq!(server.state.storage.count_unread("bob").await.unwrap(), 0);
}

#[tokio::test]
async fn test_tampered_body_is_rejected() {
    let server = TestServer::new().await;
    let key = key_of("alice");

    let signed = serde_json::to_vec(&json!({
        "sender": "alice", "receivers": ["bob"], "content": {"text": "hi"}
    }))
    .unwrap();
    let delivered = serde_json::to_vec(&json!({
        "sender": "alice", "receivers": ["bob", "carol"], "content": {"text": "hi"}
    }))
    .unwrap();

    let response = server
        .client
        .post(server.url("/send"))
        .header("zenflows-sign", fedbox::auth::sign_canonical(&key, &signed))
        .body(delivered)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert_eq!(json_of(response).await["error"], "Invalid signature");
    assert_eq!(server.state.storage.count_unread("carol").await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_signature_header_is_rejected() {
    let server = TestServer::new().await;

    let response = server
        .post_unsigned("/count-unread", &json!({"receiver": "bob"}))
        .await;
    assert_eq!(response.status(), 401);
    let body = json_of(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("Malformed signature header"));
}

#[tokio::test]
async fn test_unknown_actor_fails_key_lookup() {
    let server = TestServer::new().await;

    let response = server
        .post_as("/read", "mallory", &json!({"receiver": "mallory"}))
        .await;
    assert_eq!(response.status(), 401);
    assert!(
        json_of(response).await["error"]
            .as_str()
            .unwrap()
            .contains("Could not resolve public key")
    );
}

#[tokio::test]
async fn test_empty_message_is_rejected_before_auth() {
    let server = TestServer::new().await;

    let response = server
        .post_unsigned(
            "/send",
            &json!({"sender": "alice", "receivers": [], "content": {"text": "hi"}}),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = server
        .post_as(
            "/send",
            "alice",
            &json!({"sender": "alice", "receivers": ["bob"], "content": {}}),
        )
        .await;
    assert_eq!(response.status(), 400);
    assert_eq!(json_of(response).await["success"], false);
}

#[tokio::test]
async fn test_malformed_json_is_a_decode_error() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/read"))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body = json_of(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
}

#[tokio::test]
async fn test_set_read_on_missing_entry_is_not_found() {
    let server = TestServer::new().await;

    let response = server
        .post_as(
            "/set-read",
            "bob",
            &json!({"receiver": "bob", "message_id": 999, "read": true}),
        )
        .await;
    assert_eq!(response.status(), 404);
    assert_eq!(json_of(response).await["success"], false);
}

#[tokio::test]
async fn test_set_read_is_idempotent() {
    let server = TestServer::new().await;

    let response = server
        .post_as(
            "/send",
            "alice",
            &json!({"sender": "alice", "receivers": ["bob"], "content": {"text": "hi"}}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let id = server.state.storage.read("bob", false).await.unwrap()[0].id;

    for _ in 0..2 {
        let response = server
            .post_as(
                "/set-read",
                "bob",
                &json!({"receiver": "bob", "message_id": id, "read": true}),
            )
            .await;
        assert_eq!(response.status(), 200);
    }
    assert_eq!(server.state.storage.count_unread("bob").await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_removes_only_own_entry() {
    let server = TestServer::new().await;

    server
        .post_as(
            "/send",
            "alice",
            &json!({"sender": "alice", "receivers": ["bob", "carol"], "content": {"text": "hi"}}),
        )
        .await;
    let id = server.state.storage.read("bob", false).await.unwrap()[0].id;

    let response = server
        .post_as("/delete", "bob", &json!({"receiver": "bob", "messageId": id}))
        .await;
    assert_eq!(response.status(), 200);

    let response = server
        .post_as("/read", "bob", &json!({"receiver": "bob"}))
        .await;
    assert_eq!(json_of(response).await["messages"], json!([]));

    let response = server
        .post_as("/read", "carol", &json!({"receiver": "carol"}))
        .await;
    assert_eq!(json_of(response).await["messages"].as_array().unwrap().len(), 1);

    let response = server
        .post_as("/delete", "bob", &json!({"receiver": "bob", "messageId": id}))
        .await;
    assert_eq!(response.status(), 404);
}

//! Integration tests for WebSocket lifecycle, presence broadcast, and
//! realtime message delivery.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use chatline_server::state::AppState;
use chatline_server::ws::ConnectionRegistry;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;
type WsReader = futures_util::stream::SplitStream<WsStream>;

/// Helper: start the server on a random port and return (base_url, addr, state).
async fn start_test_server() -> (String, SocketAddr, AppState) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = chatline_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = chatline_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = AppState {
        db,
        jwt_secret,
        connections: Arc::new(ConnectionRegistry::new()),
        data_dir: data_dir.clone(),
        client_url: "http://localhost:5173".to_string(),
    };

    let app = chatline_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    let base_url = format!("http://{}", addr);
    (base_url, addr, state)
}

/// Register a user and return (access_token, user_id).
async fn signup_user(base_url: &str, name: &str, email: &str) -> (String, i64) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/auth/signup", base_url))
        .json(&json!({
            "fullname": name,
            "email": email,
            "password": "secret123",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200, "Signup failed for {}", name);
    let body: Value = resp.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    let user_id = body["user"]["id"].as_i64().unwrap();
    (token, user_id)
}

async fn connect_ws(addr: SocketAddr, token: &str) -> WsStream {
    let ws_url = format!("ws://{}/api/ws?token={}", addr, token);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Read the next JSON event (Text frame) within a timeout.
async fn next_event(read: &mut WsReader) -> Option<Value> {
    loop {
        match tokio::time::timeout(Duration::from_secs(2), read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(serde_json::from_str(&text).expect("Event should be valid JSON"));
            }
            Ok(Some(Ok(_))) => continue, // control frames
            _ => return None,
        }
    }
}

/// Drain events until a presence event listing exactly `expected` arrives.
async fn wait_for_presence(read: &mut WsReader, expected: &[i64]) -> bool {
    let mut expected_sorted = expected.to_vec();
    expected_sorted.sort_unstable();

    while let Some(event) = next_event(read).await {
        if event["event"] == "getOnlineUsers" {
            let mut users: Vec<i64> = event["onlineUsers"]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_i64().unwrap())
                .collect();
            users.sort_unstable();
            if users == expected_sorted {
                return true;
            }
        }
    }
    false
}

#[tokio::test]
async fn test_presence_broadcast_on_connect_and_disconnect() {
    let (base_url, addr, state) = start_test_server().await;
    let (token_a, user_a) = signup_user(&base_url, "Alice", "alice@example.com").await;
    let (token_b, user_b) = signup_user(&base_url, "Bob", "bob@example.com").await;

    // A connects: presence lists only A.
    let ws_a = connect_ws(addr, &token_a).await;
    let (_write_a, mut read_a) = ws_a.split();
    assert!(
        wait_for_presence(&mut read_a, &[user_a]).await,
        "A should see itself online"
    );

    // B connects: both see {A, B}, order-independent.
    let ws_b = connect_ws(addr, &token_b).await;
    let (mut write_b, mut read_b) = ws_b.split();
    assert!(
        wait_for_presence(&mut read_b, &[user_a, user_b]).await,
        "B should see both users online"
    );
    assert!(
        wait_for_presence(&mut read_a, &[user_a, user_b]).await,
        "A should see both users online"
    );

    // B disconnects: A sees {A} again and B is out of the registry.
    write_b.send(Message::Close(None)).await.unwrap();
    assert!(
        wait_for_presence(&mut read_a, &[user_a]).await,
        "A should see B go offline"
    );
    let snapshot = state.connections.snapshot_users();
    assert!(snapshot.contains(&user_a));
    assert!(!snapshot.contains(&user_b));

    // Delivering to the disconnected B is a silent no-op: the send still
    // succeeds and A receives nothing.
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/messages/send/{}", base_url, user_b))
        .bearer_auth(&token_a)
        .json(&json!({ "text": "are you there?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
}

#[tokio::test]
async fn test_message_delivered_to_connected_recipient() {
    let (base_url, addr, _state) = start_test_server().await;
    let (token_a, user_a) = signup_user(&base_url, "Alice", "alice@example.com").await;
    let (token_b, user_b) = signup_user(&base_url, "Bob", "bob@example.com").await;

    let ws_a = connect_ws(addr, &token_a).await;
    let (_write_a, mut read_a) = ws_a.split();
    let ws_b = connect_ws(addr, &token_b).await;
    let (_write_b, mut read_b) = ws_b.split();

    // Settle presence so the delivery event is the next interesting frame.
    assert!(wait_for_presence(&mut read_b, &[user_a, user_b]).await);

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/messages/send/{}", base_url, user_b))
        .bearer_auth(&token_a)
        .json(&json!({ "text": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let message_id = body["message"]["id"].as_i64().unwrap();
    assert!(message_id > 0, "Message id is server-assigned");
    assert!(!body["message"]["createdAt"].as_str().unwrap().is_empty());

    // B receives the pushed message.
    let mut delivered = None;
    while let Some(event) = next_event(&mut read_b).await {
        if event["event"] == "newMessage" {
            delivered = Some(event);
            break;
        }
    }
    let delivered = delivered.expect("B should receive the newMessage push");
    assert_eq!(delivered["message"]["senderId"].as_i64().unwrap(), user_a);
    assert_eq!(delivered["message"]["receiverId"].as_i64().unwrap(), user_b);
    assert_eq!(delivered["message"]["text"], "hi");
    assert_eq!(delivered["message"]["id"].as_i64().unwrap(), message_id);

    // The sender gets no delivery push (only the recipient is notified).
    loop {
        match tokio::time::timeout(Duration::from_millis(500), read_a.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let event: Value = serde_json::from_str(&text).unwrap();
                assert_ne!(event["event"], "newMessage", "Sender must not receive a push");
            }
            Ok(Some(Ok(_))) => continue,
            _ => break,
        }
    }
}

#[tokio::test]
async fn test_expired_token_rejected_and_never_registered() {
    let (base_url, addr, state) = start_test_server().await;
    let (token_a, user_a) = signup_user(&base_url, "Alice", "alice@example.com").await;
    let (_token_b, user_b) = signup_user(&base_url, "Bob", "bob@example.com").await;

    // Observer connection to watch presence broadcasts.
    let ws_a = connect_ws(addr, &token_a).await;
    let (_write_a, mut read_a) = ws_a.split();
    assert!(wait_for_presence(&mut read_a, &[user_a]).await);

    // Hand-craft an expired token for B with the server's real secret.
    let now = chrono::Utc::now().timestamp();
    let expired_claims = chatline_server::auth::middleware::Claims {
        sub: user_b,
        name: "Bob".to_string(),
        iat: now - 7200,
        exp: now - 3600,
    };
    let expired_token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &expired_claims,
        &jsonwebtoken::EncodingKey::from_secret(&state.jwt_secret),
    )
    .unwrap();

    let ws_b = connect_ws(addr, &expired_token).await;
    let (_write_b, mut read_b) = ws_b.split();

    // Server upgrades, then closes with 4001 (token expired).
    let msg = tokio::time::timeout(Duration::from_secs(2), read_b.next())
        .await
        .expect("Expected close message within timeout");
    match msg {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(
                frame.code,
                tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::from(4001),
                "Expected close code 4001 (token expired)"
            );
        }
        other => panic!("Expected close frame, got: {:?}", other),
    }

    // The rejected connection never appears in the registry.
    assert!(!state.connections.snapshot_users().contains(&user_b));
}

#[tokio::test]
async fn test_invalid_and_missing_tokens_rejected() {
    let (_base_url, addr, state) = start_test_server().await;

    for ws_url in [
        format!("ws://{}/api/ws?token=not_a_jwt", addr),
        format!("ws://{}/api/ws", addr),
    ] {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .expect("WebSocket should upgrade even with bad credentials");
        let (_write, mut read) = ws_stream.split();

        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .expect("Expected close message within timeout");
        match msg {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(
                    frame.code,
                    tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::from(4002),
                    "Expected close code 4002 (token missing/invalid)"
                );
            }
            Some(Ok(Message::Close(None))) => {}
            other => panic!("Expected close frame, got: {:?}", other),
        }
    }

    assert!(state.connections.is_empty());
}

#[tokio::test]
async fn test_reconnect_replaces_previous_connection() {
    let (base_url, addr, state) = start_test_server().await;
    let (token_a, user_a) = signup_user(&base_url, "Alice", "alice@example.com").await;

    let ws_first = connect_ws(addr, &token_a).await;
    let (_write_first, mut read_first) = ws_first.split();
    assert!(wait_for_presence(&mut read_first, &[user_a]).await);

    // Reconnect without cleanly closing the first connection.
    let ws_second = connect_ws(addr, &token_a).await;
    let (_write_second, mut read_second) = ws_second.split();
    assert!(wait_for_presence(&mut read_second, &[user_a]).await);

    // One entry per user, and it belongs to the new connection: dropping the
    // first socket must not deregister the second.
    drop(read_first);
    drop(_write_first);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(state.connections.snapshot_users(), vec![user_a]);
    assert!(state.connections.lookup(user_a).is_some());
}

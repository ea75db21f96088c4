//! Integration tests for the coordination channel (locks + presence).
//!
//! Each test starts the real server on an ephemeral port and drives it
//! with `tokio-tungstenite` clients, so frames cross an actual socket.

mod common;

use std::time::Duration;

use serde_json::json;

use common::{
    assert_silent, connect_auth, connect_auth_anonymous, drain_greeting, recv_json,
    recv_until_type, send_json, spawn_server, token_for,
};

fn lock_frame(issue_id: i64, username: &str, display_name: &str) -> serde_json::Value {
    json!({
        "type": "lockIssue",
        "payload": {"issueId": issue_id, "username": username, "displayName": display_name}
    })
}

fn unlock_frame(issue_id: i64, username: &str, display_name: &str) -> serde_json::Value {
    json!({
        "type": "unlockIssue",
        "payload": {"issueId": issue_id, "username": username, "displayName": display_name}
    })
}

// ---------------------------------------------------------------------------
// Test: greeting is peer-connected followed by the lock snapshot
// ---------------------------------------------------------------------------

#[tokio::test]
async fn greeting_announces_peer_id_and_lock_snapshot() {
    let (addr, _state) = spawn_server().await;

    let mut ws = connect_auth(addr, &token_for(1, "alice", Some("Alice"))).await;

    let hello = recv_json(&mut ws).await;
    assert_eq!(hello["type"], "peer-connected");
    assert!(hello["payload"].is_string());

    let status = recv_json(&mut ws).await;
    assert_eq!(status["type"], "editing-status");
    assert_eq!(status["payload"], json!({}));
}

// ---------------------------------------------------------------------------
// Test: a joiner's snapshot includes locks taken before it connected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_joiner_sees_existing_locks_in_greeting() {
    let (addr, _state) = spawn_server().await;

    let mut alice = connect_auth(addr, &token_for(1, "alice", Some("Alice"))).await;
    let alice_peer = drain_greeting(&mut alice).await;

    send_json(&mut alice, lock_frame(7, "alice", "Alice")).await;
    let echo = recv_json(&mut alice).await;
    assert_eq!(echo["type"], "editing-status");
    assert_eq!(echo["payload"]["7"]["peer"], alice_peer.as_str());

    let mut bob = connect_auth(addr, &token_for(2, "bob", Some("Bob"))).await;
    let hello = recv_json(&mut bob).await;
    assert_eq!(hello["type"], "peer-connected");
    let status = recv_json(&mut bob).await;
    assert_eq!(status["type"], "editing-status");
    assert_eq!(status["payload"]["7"]["username"], "alice");
}

// ---------------------------------------------------------------------------
// Test: of two racing holders, exactly one wins; the loser sees the table
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_acquire_is_rejected_with_the_full_table() {
    let (addr, _state) = spawn_server().await;

    let mut alice = connect_auth(addr, &token_for(1, "alice", Some("Alice"))).await;
    let alice_peer = drain_greeting(&mut alice).await;
    let mut bob = connect_auth(addr, &token_for(2, "bob", Some("Bob"))).await;
    let _bob_peer = drain_greeting(&mut bob).await;

    send_json(&mut alice, lock_frame(42, "alice", "Alice")).await;
    let granted = recv_until_type(&mut alice, "editing-status").await;
    assert_eq!(granted["payload"]["42"]["peer"], alice_peer.as_str());

    // Bob saw the broadcast, then tries anyway.
    let seen = recv_until_type(&mut bob, "editing-status").await;
    assert_eq!(seen["payload"]["42"]["displayName"], "Alice");

    send_json(&mut bob, lock_frame(42, "bob", "Bob")).await;
    let rejected = recv_until_type(&mut bob, "editing-status").await;

    // The table still names Alice; Bob did not take the lock.
    assert_eq!(rejected["payload"]["42"]["peer"], alice_peer.as_str());
    assert_eq!(rejected["payload"]["42"]["username"], "alice");

    // Alice hears nothing about the failed attempt.
    assert_silent(&mut alice, Duration::from_millis(150)).await;
}

// ---------------------------------------------------------------------------
// Test: release by the holder reaches everyone
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unlock_by_holder_broadcasts_the_shrunk_table() {
    let (addr, _state) = spawn_server().await;

    let mut alice = connect_auth(addr, &token_for(1, "alice", Some("Alice"))).await;
    drain_greeting(&mut alice).await;
    let mut bob = connect_auth(addr, &token_for(2, "bob", Some("Bob"))).await;
    drain_greeting(&mut bob).await;

    send_json(&mut alice, lock_frame(5, "alice", "Alice")).await;
    recv_until_type(&mut alice, "editing-status").await;
    recv_until_type(&mut bob, "editing-status").await;

    send_json(&mut alice, unlock_frame(5, "alice", "Alice")).await;
    let alice_view = recv_until_type(&mut alice, "editing-status").await;
    let bob_view = recv_until_type(&mut bob, "editing-status").await;

    assert_eq!(alice_view["payload"], json!({}));
    assert_eq!(bob_view["payload"], json!({}));
}

// ---------------------------------------------------------------------------
// Test: release by a non-holder is a silent no-op
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unlock_by_non_holder_is_silent() {
    let (addr, _state) = spawn_server().await;

    let mut alice = connect_auth(addr, &token_for(1, "alice", Some("Alice"))).await;
    drain_greeting(&mut alice).await;
    let mut bob = connect_auth(addr, &token_for(2, "bob", Some("Bob"))).await;
    drain_greeting(&mut bob).await;

    send_json(&mut alice, lock_frame(9, "alice", "Alice")).await;
    recv_until_type(&mut alice, "editing-status").await;
    recv_until_type(&mut bob, "editing-status").await;

    send_json(&mut bob, unlock_frame(9, "bob", "Bob")).await;

    assert_silent(&mut bob, Duration::from_millis(150)).await;
    assert_silent(&mut alice, Duration::from_millis(150)).await;
}

// ---------------------------------------------------------------------------
// Test: clearMyLocks answers the caller even when nothing was held
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clear_my_locks_always_answers_the_caller() {
    let (addr, _state) = spawn_server().await;

    let mut alice = connect_auth(addr, &token_for(1, "alice", Some("Alice"))).await;
    drain_greeting(&mut alice).await;
    let mut bob = connect_auth(addr, &token_for(2, "bob", Some("Bob"))).await;
    drain_greeting(&mut bob).await;

    // Alice holds nothing; only she gets the (unchanged) table back.
    send_json(
        &mut alice,
        json!({"type": "clearMyLocks", "payload": {"username": "alice", "displayName": "Alice"}}),
    )
    .await;
    let echo = recv_until_type(&mut alice, "editing-status").await;
    assert_eq!(echo["payload"], json!({}));
    assert_silent(&mut bob, Duration::from_millis(150)).await;

    // Now she holds two; clearing them reaches Bob too.
    send_json(&mut alice, lock_frame(1, "alice", "Alice")).await;
    recv_until_type(&mut alice, "editing-status").await;
    recv_until_type(&mut bob, "editing-status").await;
    send_json(&mut alice, lock_frame(2, "alice", "Alice")).await;
    recv_until_type(&mut alice, "editing-status").await;
    recv_until_type(&mut bob, "editing-status").await;

    send_json(
        &mut alice,
        json!({"type": "clearMyLocks", "payload": {"username": "alice", "displayName": "Alice"}}),
    )
    .await;
    let alice_view = recv_until_type(&mut alice, "editing-status").await;
    let bob_view = recv_until_type(&mut bob, "editing-status").await;
    assert_eq!(alice_view["payload"], json!({}));
    assert_eq!(bob_view["payload"], json!({}));
}

// ---------------------------------------------------------------------------
// Test: frames from anonymous connections are dropped
// ---------------------------------------------------------------------------

#[tokio::test]
async fn anonymous_connection_observes_but_cannot_mutate() {
    let (addr, state) = spawn_server().await;

    let mut anon = connect_auth_anonymous(addr).await;
    drain_greeting(&mut anon).await;

    send_json(&mut anon, lock_frame(3, "ghost", "Ghost")).await;

    assert_silent(&mut anon, Duration::from_millis(150)).await;
    assert!(state.locks.snapshot().await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: malformed frames are dropped without killing the connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_frame_does_not_break_the_connection() {
    let (addr, _state) = spawn_server().await;

    let mut alice = connect_auth(addr, &token_for(1, "alice", Some("Alice"))).await;
    let alice_peer = drain_greeting(&mut alice).await;

    send_json(&mut alice, json!({"type": "mystery", "payload": {"x": 1}})).await;
    send_json(&mut alice, json!({"not even": "an envelope"})).await;

    // The connection still works.
    send_json(&mut alice, lock_frame(4, "alice", "Alice")).await;
    let status = recv_until_type(&mut alice, "editing-status").await;
    assert_eq!(status["payload"]["4"]["peer"], alice_peer.as_str());
}

// ---------------------------------------------------------------------------
// Test: a closed connection's locks are swept after the delay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disconnect_sweeps_locks_after_the_delay() {
    let (addr, state) = spawn_server().await;

    let mut alice = connect_auth(addr, &token_for(1, "alice", Some("Alice"))).await;
    drain_greeting(&mut alice).await;
    let mut bob = connect_auth(addr, &token_for(2, "bob", Some("Bob"))).await;
    drain_greeting(&mut bob).await;

    send_json(&mut alice, lock_frame(11, "alice", "Alice")).await;
    recv_until_type(&mut alice, "editing-status").await;
    recv_until_type(&mut bob, "editing-status").await;

    drop(alice);

    // The lock survives the close itself...
    assert!(state.locks.snapshot().await.contains_key(&11));

    // ...and the survivors get the emptied table once the sweep runs
    // (test config uses a 50ms lock delay).
    let swept = recv_until_type(&mut bob, "editing-status").await;
    assert_eq!(swept["payload"], json!({}));
    assert!(state.locks.snapshot().await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: presence counts connections, not users
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_tabs_of_one_user_are_two_presence_entries() {
    let (addr, _state) = spawn_server().await;

    let token = token_for(1, "alice", Some("Alice"));
    let mut tab_a = connect_auth(addr, &token).await;
    drain_greeting(&mut tab_a).await;
    let mut tab_b = connect_auth(addr, &token).await;
    drain_greeting(&mut tab_b).await;

    send_json(
        &mut tab_a,
        json!({"type": "user-online", "payload": {"username": "alice", "name": "Alice", "userId": 1}}),
    )
    .await;
    let first = recv_until_type(&mut tab_a, "online-users").await;
    assert_eq!(first["payload"].as_array().map(Vec::len), Some(1));

    send_json(
        &mut tab_b,
        json!({"type": "user-online", "payload": {"username": "alice", "name": "Alice", "userId": 1}}),
    )
    .await;
    let second = recv_until_type(&mut tab_b, "online-users").await;
    let users = second["payload"].as_array().expect("user list");
    assert_eq!(users.len(), 2, "one entry per connection");
    assert!(users.iter().all(|u| u["userId"] == 1));

    // Explicit user-offline removes only that tab's entry.
    send_json(&mut tab_a, json!({"type": "user-offline", "payload": {}})).await;
    let after = recv_until_type(&mut tab_b, "online-users").await;
    assert_eq!(after["payload"].as_array().map(Vec::len), Some(1));
}

// ---------------------------------------------------------------------------
// Test: presence is swept after disconnect, later than locks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disconnect_sweeps_presence_after_its_own_delay() {
    let (addr, state) = spawn_server().await;

    let mut alice = connect_auth(addr, &token_for(1, "alice", Some("Alice"))).await;
    drain_greeting(&mut alice).await;
    let mut bob = connect_auth(addr, &token_for(2, "bob", Some("Bob"))).await;
    drain_greeting(&mut bob).await;

    send_json(
        &mut alice,
        json!({"type": "user-online", "payload": {"username": "alice", "name": "Alice", "userId": 1}}),
    )
    .await;
    recv_until_type(&mut alice, "online-users").await;
    recv_until_type(&mut bob, "online-users").await;

    drop(alice);
    assert_eq!(state.presence.snapshot().await.len(), 1);

    let swept = recv_until_type(&mut bob, "online-users").await;
    assert_eq!(swept["payload"].as_array().map(Vec::len), Some(0));
    assert!(state.presence.snapshot().await.is_empty());
}

//! # Authentication and Request Rules
//!
//! Challenge/response handshake, response signing, and the request timestamp
//! window as a client sees them.

use std::time::Duration;

use cn_01_signature_verification::{recover, Signer};
use serde_json::json;

use crate::harness::{error_text, random_signer, TestNode, START_MS};

// =============================================================================
// HANDSHAKE
// =============================================================================

#[tokio::test]
async fn test_authenticated_reply_is_signed_by_node() {
    let node = TestNode::new();
    let alice = random_signer();
    let mut client = node.connect();
    client.authenticate(&alice).await;

    let msg = client.request("get_ledger_balances", vec![], &[&alice]);
    let reply = client.exchange(&msg).await;
    let res = reply.res.as_ref().unwrap();

    assert_eq!(res.method, "get_ledger_balances");
    assert_eq!(res.params[0], json!([]));
    assert_eq!(reply.sig.len(), 1);
    let signer = recover(&res.canonical_bytes().unwrap(), &reply.sig[0]).unwrap();
    assert_eq!(signer, node.node_address);
}

#[tokio::test]
async fn test_business_request_before_auth_is_refused() {
    let node = TestNode::new();
    let alice = random_signer();
    let mut client = node.connect();

    let msg = client.request("get_config", vec![], &[&alice]);
    let reply = client.exchange(&msg).await;
    assert!(error_text(reply.res.as_ref().unwrap()).starts_with("Authentication required"));
    assert!(client.is_open());

    // The handshake is still possible afterwards.
    client.authenticate(&alice).await;
}

#[tokio::test]
async fn test_replayed_verify_frame_is_rejected() {
    let node = TestNode::new();
    let alice = random_signer();
    let mut first = node.connect();

    let msg = first.request("auth_request", vec![json!(alice.address())], &[]);
    let challenge = first.exchange(&msg).await.res.unwrap();
    let token = challenge.params[0]["challenge_message"].clone();
    let verify = first.request(
        "auth_verify",
        vec![json!({"challenge": token, "address": alice.address()})],
        &[&alice],
    );
    let ok = first.exchange(&verify).await.res.unwrap();
    assert_eq!(ok.params[0]["success"], true);

    // Same bytes, same valid signature, from another connection.
    let mut second = node.connect();
    let reply = second.exchange(&verify).await;
    assert_eq!(error_text(reply.res.as_ref().unwrap()), "challenge already consumed");
    assert!(second.is_open());
}

#[tokio::test]
async fn test_expired_challenge_is_rejected() {
    let node = TestNode::new();
    let alice = random_signer();
    let mut client = node.connect();

    let msg = client.request("auth_request", vec![json!(alice.address())], &[]);
    let challenge = client.exchange(&msg).await.res.unwrap();
    let token = challenge.params[0]["challenge_message"].clone();

    node.advance(Duration::from_secs(6 * 60));
    let verify = client.request(
        "auth_verify",
        vec![json!({"challenge": token, "address": alice.address()})],
        &[&alice],
    );
    let reply = client.exchange(&verify).await;
    assert_eq!(error_text(reply.res.as_ref().unwrap()), "challenge expired");

    // A fresh challenge succeeds.
    client.authenticate(&alice).await;
}

#[tokio::test]
async fn test_verify_signed_by_someone_else() {
    let node = TestNode::new();
    let (alice, mallory) = (random_signer(), random_signer());
    let mut client = node.connect();

    let msg = client.request("auth_request", vec![json!(alice.address())], &[]);
    let challenge = client.exchange(&msg).await.res.unwrap();
    let token = challenge.params[0]["challenge_message"].clone();

    let verify = client.request(
        "auth_verify",
        vec![json!({"challenge": token, "address": alice.address()})],
        &[&mallory],
    );
    let reply = client.exchange(&verify).await;
    assert_eq!(error_text(reply.res.as_ref().unwrap()), "invalid signature");
    assert!(!node.dispatcher.registry().is_connected(&alice.address()));
    assert_eq!(node.dispatcher.metrics().to_json()["auth"]["failure"], 1);
}

#[tokio::test]
async fn test_challenge_from_stranger_leaves_session_alone() {
    let node = TestNode::new();
    let alice = random_signer();
    let mut client = node.connect();
    client.authenticate(&alice).await;

    // Anyone can ask for a challenge naming Alice's address.
    let mut stranger = node.connect();
    let msg = stranger.request("auth_request", vec![json!(alice.address())], &[]);
    let challenge = stranger.exchange(&msg).await.res.unwrap();
    assert_eq!(challenge.method, "auth_challenge");

    let res = client.call(&alice, "ping", vec![]).await;
    assert_eq!(res.method, "pong");
    assert!(client.is_open());
    assert!(node.dispatcher.registry().is_connected(&alice.address()));
}

// =============================================================================
// REQUEST RULES
// =============================================================================

#[tokio::test]
async fn test_timestamp_window() {
    let node = TestNode::new();
    let alice = random_signer();
    let mut client = node.connect();
    client.authenticate(&alice).await;

    let fresh = client.request_at("ping", vec![], &[&alice], START_MS as u64);
    assert_eq!(client.exchange(&fresh).await.res.unwrap().method, "pong");

    // Twelve digits.
    let short = client.request_at("ping", vec![], &[&alice], 99_999_999_999);
    let reply = client.exchange(&short).await;
    assert!(error_text(reply.res.as_ref().unwrap())
        .starts_with("message timestamp validation failed"));

    node.advance(Duration::from_secs(61));
    let stale = client.request_at("ping", vec![], &[&alice], START_MS as u64);
    let reply = client.exchange(&stale).await;
    assert!(error_text(reply.res.as_ref().unwrap()).contains("expired"));

    // Errors never close the connection.
    let now = client.request("ping", vec![], &[&alice]);
    assert_eq!(client.exchange(&now).await.res.unwrap().method, "pong");
}

#[tokio::test]
async fn test_unknown_method_keeps_connection_open() {
    let node = TestNode::new();
    let alice = random_signer();
    let mut client = node.connect();
    client.authenticate(&alice).await;

    let res = client.call(&alice, "transfer_everything", vec![]).await;
    assert_eq!(error_text(&res), "Unsupported method");
    assert!(client.is_open());

    let res = client.call(&alice, "get_config", vec![]).await;
    assert_eq!(res.params[0]["broker_address"], json!(node.node_address));
    assert_eq!(node.dispatcher.metrics().to_json()["unsupported_requests"], 1);
}

#[tokio::test]
async fn test_garbage_after_auth_is_answered_not_fatal() {
    let node = TestNode::new();
    let alice = random_signer();
    let mut client = node.connect();
    client.authenticate(&alice).await;

    client.send_raw("{\"req\": 42");
    let (res, _) = client.recv_method("error").await;
    assert_eq!(error_text(&res), "Invalid message format");

    let res = client.call(&alice, "ping", vec![]).await;
    assert_eq!(res.method, "pong");
}

#[tokio::test]
async fn test_idle_session_expires() {
    let node = TestNode::new();
    let alice = random_signer();
    let mut client = node.connect();
    client.authenticate(&alice).await;

    node.advance(Duration::from_secs(24 * 3600 + 1));
    let msg = client.request("ping", vec![], &[&alice]);
    client.send(&msg);
    let (res, _) = client.recv_method("error").await;
    assert!(error_text(&res).starts_with("Session expired"));

    client.closed().await;
    assert!(!node.dispatcher.registry().is_connected(&alice.address()));
}

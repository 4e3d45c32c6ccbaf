//! # Virtual Session Relay
//!
//! Frames naming an application session reach the other live participants
//! byte for byte, and only when the sender signed the payload.

use cn_01_signature_verification::{EcdsaSigner, Signer};
use serde_json::json;
use shared_types::{RpcData, RpcMessage};

use crate::harness::{error_text, random_signer, sign_half, Client, TestNode};

/// Open a zero-allocation session for `participants` through `creator`.
async fn open_session(
    client: &mut Client,
    creator: &EcdsaSigner,
    participants: &[&EcdsaSigner],
    quorum: u64,
) -> String {
    let definition = json!({
        "participants": participants.iter().map(|p| p.address()).collect::<Vec<_>>(),
        "weights": vec![1; participants.len()],
        "quorum": quorum,
        "challenge": 86400,
        "nonce": 1,
    });
    let res = client
        .call(
            creator,
            "create_app_session",
            vec![json!({"definition": definition, "allocations": []})],
        )
        .await;
    assert_eq!(res.method, "create_app_session", "{res:?}");
    res.params[0]["app_session_id"].as_str().unwrap().to_string()
}

fn relay_frame(session_id: &str, signers: &[&EcdsaSigner], body: &str) -> RpcMessage {
    let req = RpcData::new(7, "message", vec![json!({"move": body})], 1_700_000_000_000);
    let sig = sign_half(&req, signers);
    RpcMessage {
        app_session_id: Some(session_id.to_string()),
        ..RpcMessage::request(req, sig)
    }
}

#[tokio::test]
async fn test_relay_reaches_other_participants_verbatim() {
    let node = TestNode::new();
    let (alice, bob, carol) = (random_signer(), random_signer(), random_signer());
    let mut a = node.connect();
    let mut b = node.connect();
    let mut c = node.connect();
    a.authenticate(&alice).await;
    b.authenticate(&bob).await;
    c.authenticate(&carol).await;

    let session_id = open_session(&mut a, &alice, &[&alice, &bob, &carol], 2).await;

    // Key order and spacing differ from what the node would produce.
    let frame = relay_frame(&session_id, &[&alice], "e4");
    let raw = format!(
        "{{ \"sig\": {}, \"app_session_id\": \"{}\", \"req\": {} }}",
        json!(frame.sig),
        session_id,
        serde_json::to_string(frame.req.as_ref().unwrap()).unwrap(),
    );
    a.send_raw(raw.clone());

    assert_eq!(b.recv_relay().await, raw);
    assert_eq!(c.recv_relay().await, raw);
    a.assert_no_relay().await;
}

#[tokio::test]
async fn test_relay_skips_offline_participants() {
    let node = TestNode::new();
    let (alice, bob, carol) = (random_signer(), random_signer(), random_signer());
    let mut a = node.connect();
    let mut b = node.connect();
    a.authenticate(&alice).await;
    b.authenticate(&bob).await;

    let session_id = open_session(&mut a, &alice, &[&alice, &bob, &carol], 2).await;
    let frame = relay_frame(&session_id, &[&alice], "d4");
    a.send(&frame);

    let relayed: RpcMessage = serde_json::from_str(&b.recv_relay().await).unwrap();
    assert_eq!(relayed, frame);
    a.assert_no_relay().await;
}

#[tokio::test]
async fn test_relay_requires_sender_signature() {
    let node = TestNode::new();
    let (alice, bob, mallory) = (random_signer(), random_signer(), random_signer());
    let mut a = node.connect();
    let mut b = node.connect();
    a.authenticate(&alice).await;
    b.authenticate(&bob).await;
    let session_id = open_session(&mut a, &alice, &[&alice, &bob], 1).await;

    // Signed by someone else, sent on Alice's connection.
    a.send(&relay_frame(&session_id, &[&mallory], "e4"));
    let (res, _) = a.recv_method("error").await;
    assert!(error_text(&res).starts_with("Failed to forward message"));
    assert_eq!(res.request_id, 7);

    // Unsigned.
    a.send(&relay_frame(&session_id, &[], "e5"));
    let (res, _) = a.recv_method("error").await;
    assert!(error_text(&res).starts_with("Failed to forward message"));

    b.assert_no_relay().await;
    assert!(a.is_open());
}

#[tokio::test]
async fn test_relay_to_unknown_session() {
    let node = TestNode::new();
    let alice = random_signer();
    let mut a = node.connect();
    a.authenticate(&alice).await;

    a.send(&relay_frame("0xdeadbeef", &[&alice], "e4"));
    let (res, _) = a.recv_method("error").await;
    assert!(error_text(&res).contains("not found"), "{res:?}");
}

#[tokio::test]
async fn test_relay_is_exempt_from_timestamp_window() {
    let node = TestNode::new();
    let (alice, bob) = (random_signer(), random_signer());
    let mut a = node.connect();
    let mut b = node.connect();
    a.authenticate(&alice).await;
    b.authenticate(&bob).await;
    let session_id = open_session(&mut a, &alice, &[&alice, &bob], 1).await;

    node.advance(std::time::Duration::from_secs(3600));
    let req = RpcData::new(9, "message", vec![], 42);
    let frame = RpcMessage {
        app_session_id: Some(session_id),
        ..RpcMessage::request(req.clone(), sign_half(&req, &[&alice]))
    };
    a.send(&frame);

    let relayed: RpcMessage = serde_json::from_str(&b.recv_relay().await).unwrap();
    assert_eq!(relayed.req, Some(req));
}

//! # Ledger Flows
//!
//! Mutating methods end to end: app session funding and redistribution,
//! channel finalization, and the balance pushes and history records they
//! leave behind.

use cn_01_signature_verification::{keccak256, recover, Signer};
use cn_03_rpc_gateway::rpc::wallet_account;
use cn_03_rpc_gateway::Clock;
use rust_decimal::prelude::dec;
use serde_json::{json, Value};
use shared_types::{Address, Channel, ChannelStatus};

use crate::harness::{error_text, random_signer, usdc, TestNode};

fn definition(participants: &[Address], quorum: u64) -> Value {
    json!({
        "participants": participants,
        "weights": vec![1; participants.len()],
        "quorum": quorum,
        "challenge": 86400,
        "nonce": 42,
    })
}

#[tokio::test]
async fn test_app_session_funding_and_redistribution() {
    let node = TestNode::new();
    let (alice, bob) = (random_signer(), random_signer());
    let (a_addr, b_addr) = (alice.address(), bob.address());
    node.fund(&a_addr, "usdc", dec!(100));
    node.fund(&b_addr, "usdc", dec!(50));

    let mut a = node.connect();
    a.authenticate(&alice).await;

    // Both allocations are funded, so both participants sign.
    let create = a.request(
        "create_app_session",
        vec![json!({
            "definition": definition(&[a_addr, b_addr], 2),
            "allocations": [
                {"participant": a_addr, "asset": "usdc", "amount": "60"},
                {"participant": b_addr, "asset": "usdc", "amount": "20"},
            ],
        })],
        &[&alice, &bob],
    );
    let res = a.exchange(&create).await.res.unwrap();
    assert_eq!(res.method, "create_app_session", "{res:?}");
    assert_eq!(res.params[0]["status"], "open");
    assert_eq!(res.params[0]["version"], 1);
    let session_id = res.params[0]["app_session_id"].as_str().unwrap().to_string();

    let (bu, _) = a.recv_method("bu").await;
    assert_eq!(bu.params[0], json!([{"asset": "usdc", "amount": "40"}]));
    assert_eq!(node.balance(&a_addr, &session_id, "usdc"), dec!(60));
    assert_eq!(node.balance(&b_addr, &wallet_account(&b_addr), "usdc"), dec!(30));

    // One signature is below the quorum of two.
    let allocations = json!([
        {"participant": a_addr, "asset": "usdc", "amount": "30"},
        {"participant": b_addr, "asset": "usdc", "amount": "50"},
    ]);
    let res = a
        .call(
            &alice,
            "close_app_session",
            vec![json!({"app_session_id": session_id, "allocations": allocations})],
        )
        .await;
    assert!(error_text(&res).starts_with("unauthorized"));

    let close = a.request(
        "close_app_session",
        vec![json!({"app_session_id": session_id, "allocations": allocations})],
        &[&alice, &bob],
    );
    let res = a.exchange(&close).await.res.unwrap();
    assert_eq!(res.params[0]["status"], "closed");

    assert_eq!(node.balance(&a_addr, &wallet_account(&a_addr), "usdc"), dec!(70));
    assert_eq!(node.balance(&b_addr, &wallet_account(&b_addr), "usdc"), dec!(80));
    assert_eq!(node.balance(&a_addr, &session_id, "usdc"), dec!(0));
    assert_eq!(node.balance(&b_addr, &session_id, "usdc"), dec!(0));

    let res = a
        .call(&alice, "get_app_sessions", vec![json!({"status": "closed"})])
        .await;
    assert_eq!(res.params[0][0]["app_session_id"], json!(session_id));
    assert_eq!(res.params[0][0]["version"], 2);

    // Alice's history holds both mutations and the refused close, newest first.
    let res = a.call(&alice, "get_rpc_history", vec![]).await;
    let records = res.params[0].as_array().unwrap();
    let methods: Vec<&str> = records.iter().map(|r| r["method"].as_str().unwrap()).collect();
    assert_eq!(methods, ["close_app_session", "close_app_session", "create_app_session"]);
    assert!(records[1]["response"].as_str().unwrap().contains("unauthorized"));
}

#[tokio::test]
async fn test_create_rejects_unfunded_allocation() {
    let node = TestNode::new();
    let alice = random_signer();
    node.fund(&alice.address(), "usdc", dec!(5));

    let mut a = node.connect();
    a.authenticate(&alice).await;
    let res = a
        .call(
            &alice,
            "create_app_session",
            vec![json!({
                "definition": definition(&[alice.address(), random_signer().address()], 1),
                "allocations": [{"participant": alice.address(), "asset": "usdc", "amount": "5.000001"}],
            })],
        )
        .await;
    assert!(error_text(&res).contains("insufficient funds"), "{res:?}");
    assert_eq!(node.balance(&alice.address(), &wallet_account(&alice.address()), "usdc"), dec!(5));

    // The refusal is on record with the node's signed answer.
    let res = a.call(&alice, "get_rpc_history", vec![]).await;
    let records = res.params[0].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["method"], "create_app_session");
    assert!(records[0]["response"].as_str().unwrap().contains("insufficient funds"));
}

#[tokio::test]
async fn test_amounts_are_never_rounded() {
    let node = TestNode::new();
    let (alice, bob) = (random_signer(), random_signer());
    let (a_addr, b_addr) = (alice.address(), bob.address());
    node.fund(&a_addr, "usdc", dec!(123456789013));
    node.fund(&b_addr, "usdc", dec!(100));

    let mut a = node.connect();
    a.authenticate(&alice).await;
    let create = |amount: &str, owner: Address| {
        json!({
            "definition": definition(&[owner, if owner == a_addr { b_addr } else { a_addr }], 1),
            "allocations": [{"participant": owner, "asset": "usdc", "amount": amount}],
        })
    };

    // 30 significant digits do not fit the ledger's decimal type.
    let res = a
        .call(
            &alice,
            "create_app_session",
            vec![create("123456789012.123456789012345678", a_addr)],
        )
        .await;
    assert!(error_text(&res).contains("exceeds the supported precision"), "{res:?}");

    // Neither does the wallet balance this debit would leave behind.
    let res = a
        .call(&alice, "create_app_session", vec![create("12.123456789012345678", a_addr)])
        .await;
    assert!(error_text(&res).contains("exceeds the supported precision"), "{res:?}");
    assert_eq!(node.balance(&a_addr, &wallet_account(&a_addr), "usdc"), dec!(123456789013));

    // Eighteen decimals on a smaller balance go through digit for digit.
    let mut b = node.connect();
    b.authenticate(&bob).await;
    let res = b
        .call(&bob, "create_app_session", vec![create("12.123456789012345678", b_addr)])
        .await;
    let session_id = res.params[0]["app_session_id"].as_str().unwrap().to_string();
    assert_eq!(
        node.balance(&b_addr, &session_id, "usdc").to_string(),
        "12.123456789012345678"
    );
    let (bu, _) = b.recv_method("bu").await;
    assert_eq!(bu.params[0][0]["amount"], "87.876543210987654322");
}

#[tokio::test]
async fn test_close_channel_returns_signed_final_state() {
    let node = TestNode::new();
    let alice = random_signer();
    let a_addr = alice.address();
    node.fund(&a_addr, "usdc", dec!(12.5));

    let now = node.clock.now();
    node.stores
        .channels
        .upsert(Channel {
            channel_id: "0xc0ffee".into(),
            participant: a_addr,
            status: ChannelStatus::Open,
            token: usdc().token,
            amount: 10_000_000,
            chain_id: usdc().chain_id,
            adjudicator: Address::from_bytes([7; 20]),
            challenge: 3600,
            nonce: 1,
            version: 3,
            created_at: now,
            updated_at: now,
        })
        .unwrap();

    let mut a = node.connect();
    a.authenticate(&alice).await;

    let destination = Address::from_bytes([0x11; 20]);
    let res = a
        .call(
            &alice,
            "close_channel",
            vec![json!({"channel_id": "0xc0ffee", "funds_destination": destination})],
        )
        .await;
    let state = &res.params[0];
    assert_eq!(state["intent"], "finalize");
    assert_eq!(state["version"], 4);
    assert_eq!(state["allocations"][0]["amount"], "12500000");
    assert_eq!(state["allocations"][1]["destination"], json!(node.node_address));

    // The node signed exactly the state it returned.
    let signed = json!({
        "allocations": state["allocations"],
        "channel_id": state["channel_id"],
        "intent": state["intent"],
        "version": state["version"],
    });
    let bytes = serde_json::to_vec(&signed).unwrap();
    assert_eq!(state["state_hash"], format!("0x{}", hex::encode(keccak256(&bytes))));
    let signer = recover(&bytes, state["server_signature"].as_str().unwrap()).unwrap();
    assert_eq!(signer, node.node_address);

    let (cu, _) = a.recv_method("cu").await;
    assert_eq!(cu.params[0]["channel_id"], "0xc0ffee");
    assert_eq!(cu.params[0]["version"], 4);

    // Someone else cannot touch the channel.
    let mallory = random_signer();
    let mut m = node.connect();
    m.authenticate(&mallory).await;
    let res = m
        .call(
            &mallory,
            "close_channel",
            vec![json!({"channel_id": "0xc0ffee", "funds_destination": destination})],
        )
        .await;
    assert!(error_text(&res).starts_with("unauthorized"));

    // The refusal lands in Mallory's history, not Alice's.
    let res = m.call(&mallory, "get_rpc_history", vec![]).await;
    assert_eq!(res.params[0][0]["method"], "close_channel");
    assert!(res.params[0][0]["response"].as_str().unwrap().contains("unauthorized"));
    let res = a.call(&alice, "get_rpc_history", vec![]).await;
    assert!(res.params[0]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["response"].as_str().unwrap().contains("finalize")));
}

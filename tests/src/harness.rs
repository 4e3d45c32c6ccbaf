//! # Test Harness
//!
//! An in-process clearnode: a [`Dispatcher`] over in-memory stores and a
//! manual clock, with clients connected through channels instead of sockets.
//! Frames cross the boundary as JSON text exactly as they would on the wire.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use cn_01_signature_verification::{EcdsaSigner, Signer};
use cn_03_rpc_gateway::rpc::wallet_account;
use cn_03_rpc_gateway::{ClearnodeConfig, Clock, ConnectionHandle, Dispatcher, ManualClock, Stores};
use k256::ecdsa::SigningKey;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use shared_types::{Address, Asset, RpcData, RpcMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Clock start, 2023-11-14T22:13:20Z.
pub const START_MS: i64 = 1_700_000_000_000;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const SILENCE: Duration = Duration::from_millis(200);

/// Server-initiated methods a client may see between responses.
const PUSHES: [&str; 3] = ["bu", "cu", "channels"];

pub fn random_signer() -> EcdsaSigner {
    EcdsaSigner::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
}

pub fn usdc() -> Asset {
    Asset {
        token: Address::from_bytes([0xAA; 20]),
        chain_id: 137,
        symbol: "usdc".into(),
        decimals: 6,
    }
}

/// Signatures of `signers` over the canonical bytes of `half`.
pub fn sign_half(half: &RpcData, signers: &[&EcdsaSigner]) -> Vec<String> {
    let bytes = half.canonical_bytes().unwrap();
    signers
        .iter()
        .map(|s| s.sign(&bytes).unwrap().to_hex())
        .collect()
}

pub struct TestNode {
    pub dispatcher: Arc<Dispatcher>,
    pub clock: Arc<ManualClock>,
    pub stores: Stores,
    pub node_address: Address,
}

impl TestNode {
    pub fn new() -> Self {
        Self::with_config(ClearnodeConfig {
            assets: vec![usdc()],
            ..ClearnodeConfig::default()
        })
    }

    pub fn with_config(config: ClearnodeConfig) -> Self {
        let clock = Arc::new(ManualClock::at_millis(START_MS));
        let stores = Stores::in_memory();
        let signer = random_signer();
        let node_address = signer.address();
        let dispatcher = Dispatcher::new(
            Arc::new(config),
            Arc::new(signer),
            stores.clone(),
            clock.clone(),
        );
        Self {
            dispatcher: Arc::new(dispatcher),
            clock,
            stores,
            node_address,
        }
    }

    pub fn connect(&self) -> Client {
        let (tx, inbound) = mpsc::unbounded_channel();
        let (handle, rx) = ConnectionHandle::channel(64);
        let dispatcher = Arc::clone(&self.dispatcher);
        let conn = handle.clone();
        let task = tokio::spawn(async move {
            dispatcher
                .serve_connection(UnboundedReceiverStream::new(inbound), conn)
                .await
        });
        Client {
            tx,
            rx,
            handle,
            task,
            clock: Arc::clone(&self.clock),
            next_id: 100,
        }
    }

    /// Credit `amount` of `asset` to the wallet account of `who`.
    pub fn fund(&self, who: &Address, asset: &str, amount: Decimal) {
        self.stores
            .ledger
            .participant(*who)
            .record(&wallet_account(who), asset, amount)
            .unwrap();
    }

    pub fn balance(&self, who: &Address, account_id: &str, asset: &str) -> Decimal {
        self.stores
            .ledger
            .participant(*who)
            .balance(account_id, asset)
            .unwrap()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

impl Default for TestNode {
    fn default() -> Self {
        Self::new()
    }
}

/// One client connection.
pub struct Client {
    tx: mpsc::UnboundedSender<Result<String, Infallible>>,
    rx: mpsc::Receiver<String>,
    pub handle: ConnectionHandle,
    task: JoinHandle<()>,
    clock: Arc<ManualClock>,
    next_id: u64,
}

impl Client {
    pub fn send_raw(&self, raw: impl Into<String>) {
        self.tx.send(Ok(raw.into())).unwrap();
    }

    pub fn send(&self, msg: &RpcMessage) {
        self.send_raw(serde_json::to_string(msg).unwrap());
    }

    /// A request stamped with the node's current time.
    pub fn request(&mut self, method: &str, params: Vec<Value>, signers: &[&EcdsaSigner]) -> RpcMessage {
        let now = self.clock.now_millis();
        self.request_at(method, params, signers, now)
    }

    pub fn request_at(
        &mut self,
        method: &str,
        params: Vec<Value>,
        signers: &[&EcdsaSigner],
        timestamp: u64,
    ) -> RpcMessage {
        self.next_id += 1;
        let req = RpcData::new(self.next_id, method, params, timestamp);
        let sig = sign_half(&req, signers);
        RpcMessage::request(req, sig)
    }

    pub async fn recv_raw(&mut self) -> String {
        tokio::time::timeout(RECV_TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
    }

    pub async fn recv(&mut self) -> RpcMessage {
        let raw = self.recv_raw().await;
        serde_json::from_str(&raw).unwrap()
    }

    /// Next frame whose response method is `method`, skipping others.
    pub async fn recv_method(&mut self, method: &str) -> (RpcData, Vec<String>) {
        loop {
            let msg = self.recv().await;
            if let Some(res) = msg.res {
                if res.method == method {
                    return (res, msg.sig);
                }
            }
        }
    }

    /// Next relayed frame, verbatim.
    pub async fn recv_relay(&mut self) -> String {
        loop {
            let raw = self.recv_raw().await;
            let msg: RpcMessage = serde_json::from_str(&raw).unwrap();
            if msg.app_session_id.is_some() {
                return raw;
            }
        }
    }

    /// Send `msg` and wait for the frame answering it, skipping pushes.
    pub async fn exchange(&mut self, msg: &RpcMessage) -> RpcMessage {
        let id = msg.req.as_ref().map(|r| r.request_id).unwrap();
        self.send(msg);
        loop {
            let reply = self.recv().await;
            let Some(res) = reply.res.as_ref() else { continue };
            if res.request_id == id && !PUSHES.contains(&res.method.as_str()) {
                return reply;
            }
        }
    }

    /// Signed request by `signer` and its reply.
    pub async fn call(&mut self, signer: &EcdsaSigner, method: &str, params: Vec<Value>) -> RpcData {
        let msg = self.request(method, params, &[signer]);
        self.exchange(&msg).await.res.unwrap()
    }

    /// Full challenge/response handshake, consuming the initial pushes.
    pub async fn authenticate(&mut self, who: &EcdsaSigner) {
        let msg = self.request("auth_request", vec![json!(who.address())], &[]);
        let challenge = self.exchange(&msg).await.res.unwrap();
        assert_eq!(challenge.method, "auth_challenge");
        let token = challenge.params[0]["challenge_message"].clone();

        let msg = self.request(
            "auth_verify",
            vec![json!({"challenge": token, "address": who.address()})],
            &[who],
        );
        let verified = self.exchange(&msg).await.res.unwrap();
        assert_eq!(verified.params[0]["success"], true, "{verified:?}");

        self.recv_method("channels").await;
        self.recv_method("bu").await;
    }

    /// Assert no relayed frame arrives within a short window.
    pub async fn assert_no_relay(&mut self) {
        let deadline = tokio::time::Instant::now() + SILENCE;
        while let Ok(Some(raw)) = tokio::time::timeout_at(deadline, self.rx.recv()).await {
            let msg: RpcMessage = serde_json::from_str(&raw).unwrap();
            assert!(msg.app_session_id.is_none(), "unexpected relay: {raw}");
        }
    }

    /// Wait for the node to end this connection.
    pub async fn closed(self) {
        tokio::time::timeout(RECV_TIMEOUT, self.task)
            .await
            .expect("connection still open")
            .unwrap();
        assert!(self.handle.is_closed());
    }

    pub fn is_open(&self) -> bool {
        !self.handle.is_closed()
    }
}

/// Text of an error frame.
pub fn error_text(res: &RpcData) -> &str {
    assert_eq!(res.method, "error", "{res:?}");
    res.params[0]["error"].as_str().unwrap()
}

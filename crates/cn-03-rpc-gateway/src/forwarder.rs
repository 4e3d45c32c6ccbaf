//! # Virtual-Session Forwarder
//!
//! Relays frames that name an application session to the session's other
//! participants. Authorization comes from the recovered signer set, not from
//! membership claims: the sender must be one of the addresses that signed the
//! payload half.
//!
//! The relay never touches the ledger or the session record and forwards the
//! original bytes unmodified.

use crate::domain::error::RpcError;
use crate::domain::metrics::NodeMetrics;
use crate::ports::AppSessionStore;
use crate::registry::ConnectionRegistry;
use cn_01_signature_verification::recover;
use shared_types::{Address, RpcData, RpcMessage};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Forwarder {
    sessions: Arc<dyn AppSessionStore>,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<NodeMetrics>,
}

impl Forwarder {
    pub fn new(
        sessions: Arc<dyn AppSessionStore>,
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        Self {
            sessions,
            registry,
            metrics,
        }
    }

    /// Relay `raw` to every live participant of the named session except
    /// `sender`. Returns the number of recipients the frame was handed to.
    pub async fn forward(
        &self,
        msg: &RpcMessage,
        raw: &str,
        sender: &Address,
    ) -> Result<usize, RpcError> {
        let session_id = msg
            .app_session_id
            .as_deref()
            .ok_or_else(|| RpcError::Protocol("missing app_session_id".into()))?;

        let signers = recovered_signers(msg)?;
        if !signers.contains(sender) {
            warn!(
                sender = %sender,
                session_id,
                signatures = msg.sig.len(),
                "Relay rejected: sender did not sign the payload"
            );
            return Err(RpcError::Authorization(
                "sender is not among the payload signers".into(),
            ));
        }

        let session = self
            .sessions
            .get(session_id)?
            .ok_or_else(|| RpcError::NotFound(format!("app session {session_id}")))?;

        let mut delivered = 0;
        for recipient in session.participants.iter().filter(|p| *p != sender) {
            if self.registry.send(recipient, raw.to_string()).await {
                self.metrics.record_sent();
                delivered += 1;
                debug!(session_id, recipient = %recipient, "Relayed frame");
            } else {
                debug!(session_id, recipient = %recipient, "Recipient offline, frame dropped");
            }
        }
        Ok(delivered)
    }
}

/// Addresses recovered from every signature over the payload half.
pub fn recovered_signers(msg: &RpcMessage) -> Result<HashSet<Address>, RpcError> {
    let payload = msg
        .payload()
        .ok_or_else(|| RpcError::Protocol("message carries no payload".into()))?;
    signers_of(payload, &msg.sig)
}

/// Recover the signer of each signature over `data`'s canonical bytes.
///
/// A malformed signature rejects the whole set.
pub fn signers_of(data: &RpcData, signatures: &[String]) -> Result<HashSet<Address>, RpcError> {
    let bytes = data
        .canonical_bytes()
        .map_err(|e| RpcError::Protocol(e.to_string()))?;

    signatures
        .iter()
        .map(|sig| {
            recover(&bytes, sig).map_err(|e| RpcError::Auth(format!("invalid signature: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryAppSessionStore;
    use crate::registry::ConnectionHandle;
    use cn_01_signature_verification::{EcdsaSigner, Signer};
    use k256::ecdsa::SigningKey;
    use shared_types::{AppSession, DEFAULT_PROTOCOL};
    use std::time::Duration;
    use tokio::sync::mpsc;

    const SESSION: &str = "0x00000000000000000000000000000000000000000000000000000000000000aa";

    fn signer() -> EcdsaSigner {
        EcdsaSigner::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
    }

    struct Fixture {
        forwarder: Forwarder,
        registry: Arc<ConnectionRegistry>,
        a: EcdsaSigner,
        b: EcdsaSigner,
        c: EcdsaSigner,
    }

    fn fixture() -> Fixture {
        let (a, b, c) = (signer(), signer(), signer());
        let sessions = Arc::new(InMemoryAppSessionStore::new());
        sessions
            .insert(
                AppSession::new(
                    SESSION,
                    DEFAULT_PROTOCOL,
                    vec![a.address(), b.address(), c.address()],
                    vec![1, 1, 1],
                    2,
                    0,
                    1,
                )
                .unwrap(),
            )
            .unwrap();
        let registry = Arc::new(ConnectionRegistry::new(Duration::from_millis(50)));
        let forwarder = Forwarder::new(sessions, registry.clone(), Arc::new(NodeMetrics::new()));
        Fixture {
            forwarder,
            registry,
            a,
            b,
            c,
        }
    }

    fn connect(registry: &ConnectionRegistry, who: &EcdsaSigner) -> mpsc::Receiver<String> {
        let (handle, rx) = ConnectionHandle::channel(8);
        registry.register(who.address(), handle);
        rx
    }

    fn relay_frame(session: &str, signers: &[&EcdsaSigner]) -> (RpcMessage, String) {
        let req = RpcData::new(1, "message", vec![serde_json::json!({"move": "e4"})], 1);
        let bytes = req.canonical_bytes().unwrap();
        let sig = signers
            .iter()
            .map(|s| s.sign(&bytes).unwrap().to_hex())
            .collect();
        let mut msg = RpcMessage::request(req, sig);
        msg.app_session_id = Some(session.to_string());
        let raw = serde_json::to_string(&msg).unwrap();
        (msg, raw)
    }

    #[tokio::test]
    async fn test_relays_identical_bytes_to_other_participants() {
        let f = fixture();
        let mut rx_a = connect(&f.registry, &f.a);
        let mut rx_b = connect(&f.registry, &f.b);
        let mut rx_c = connect(&f.registry, &f.c);

        let (msg, raw) = relay_frame(SESSION, &[&f.a]);
        let delivered = f.forwarder.forward(&msg, &raw, &f.a.address()).await.unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(rx_b.recv().await.unwrap(), raw);
        assert_eq!(rx_c.recv().await.unwrap(), raw);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_offline_participants_skipped() {
        let f = fixture();
        let mut rx_b = connect(&f.registry, &f.b);

        let (msg, raw) = relay_frame(SESSION, &[&f.a]);
        let delivered = f.forwarder.forward(&msg, &raw, &f.a.address()).await.unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(rx_b.recv().await.unwrap(), raw);
    }

    #[tokio::test]
    async fn test_sender_must_be_a_signer() {
        let f = fixture();
        let _rx_c = connect(&f.registry, &f.c);

        // Signed by B and C, sent by A.
        let (msg, raw) = relay_frame(SESSION, &[&f.b, &f.c]);
        let result = f.forwarder.forward(&msg, &raw, &f.a.address()).await;
        assert!(matches!(result, Err(RpcError::Authorization(_))));
    }

    #[tokio::test]
    async fn test_unsigned_relay_rejected() {
        let f = fixture();
        let (msg, raw) = relay_frame(SESSION, &[]);
        let result = f.forwarder.forward(&msg, &raw, &f.a.address()).await;
        assert!(matches!(result, Err(RpcError::Authorization(_))));
    }

    #[tokio::test]
    async fn test_malformed_signature_rejected() {
        let f = fixture();
        let (mut msg, raw) = relay_frame(SESSION, &[&f.a]);
        msg.sig.push("0x1234".into());
        let result = f.forwarder.forward(&msg, &raw, &f.a.address()).await;
        assert!(matches!(result, Err(RpcError::Auth(_))));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let f = fixture();
        let (msg, raw) = relay_frame("0xdead", &[&f.a]);
        let result = f.forwarder.forward(&msg, &raw, &f.a.address()).await;
        assert!(matches!(result, Err(RpcError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_response_half_used_when_no_request() {
        let f = fixture();
        let mut rx_b = connect(&f.registry, &f.b);

        let res = RpcData::new(2, "message", vec![], 1);
        let sig = f.a.sign(&res.canonical_bytes().unwrap()).unwrap().to_hex();
        let mut msg = RpcMessage::response(res, vec![sig]);
        msg.app_session_id = Some(SESSION.to_string());
        let raw = serde_json::to_string(&msg).unwrap();

        assert_eq!(f.forwarder.forward(&msg, &raw, &f.a.address()).await.unwrap(), 1);
        assert_eq!(rx_b.recv().await.unwrap(), raw);
    }
}

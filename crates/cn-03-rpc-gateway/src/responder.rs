//! Signed outbound frames.
//!
//! Every frame the node emits carries a response half signed with the node
//! key over that half's canonical bytes. A frame that cannot be serialized or
//! signed is never produced; the caller gets [`RpcError::Signing`].

use crate::domain::error::RpcError;
use crate::domain::methods;
use crate::ports::Clock;
use cn_01_signature_verification::Signer;
use serde_json::{json, Value};
use shared_types::{Address, RpcData, RpcMessage};
use std::sync::Arc;

/// A ready-to-send frame and what was signed.
#[derive(Debug, Clone)]
pub struct SignedFrame {
    /// The serialized envelope.
    pub text: String,
    /// Canonical bytes of the response half.
    pub payload: Vec<u8>,
    pub signatures: Vec<String>,
}

#[derive(Clone)]
pub struct Responder {
    signer: Arc<dyn Signer>,
    clock: Arc<dyn Clock>,
}

impl Responder {
    pub fn new(signer: Arc<dyn Signer>, clock: Arc<dyn Clock>) -> Self {
        Self { signer, clock }
    }

    /// The node's own address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn response(
        &self,
        request_id: u64,
        method: &str,
        params: Vec<Value>,
    ) -> Result<SignedFrame, RpcError> {
        let res = RpcData::new(request_id, method, params, self.clock.now_millis());
        self.sign(res)
    }

    /// Error frame echoing `request_id`, or a time-derived id when unknown.
    pub fn error(&self, request_id: Option<u64>, message: &str) -> Result<SignedFrame, RpcError> {
        let id = request_id.unwrap_or_else(|| self.clock.now_millis());
        self.response(id, methods::ERROR, vec![json!({ "error": message })])
    }

    /// Unsolicited server push (`bu`, `channels`, `cu`).
    pub fn push(&self, method: &str, params: Vec<Value>) -> Result<SignedFrame, RpcError> {
        self.response(self.clock.now_millis(), method, params)
    }

    /// Sign arbitrary bytes with the node key, `0x` hex.
    pub fn sign_bytes(&self, bytes: &[u8]) -> Result<String, RpcError> {
        self.signer
            .sign(bytes)
            .map(|sig| sig.to_hex())
            .map_err(|e| RpcError::Signing(e.to_string()))
    }

    fn sign(&self, res: RpcData) -> Result<SignedFrame, RpcError> {
        let payload = res
            .canonical_bytes()
            .map_err(|e| RpcError::Signing(e.to_string()))?;
        let signatures = vec![self.sign_bytes(&payload)?];
        let message = RpcMessage::response(res, signatures.clone());
        let text = serde_json::to_string(&message).map_err(|e| RpcError::Signing(e.to_string()))?;
        Ok(SignedFrame {
            text,
            payload,
            signatures,
        })
    }
}

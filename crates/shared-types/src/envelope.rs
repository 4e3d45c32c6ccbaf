//! # RPC Envelope
//!
//! One JSON object per WebSocket text message:
//!
//! ```text
//! {
//!   "req": {"request_id": u64, "method": string, "params": [...], "timestamp": u64} | null,
//!   "res": {same shape} | null,
//!   "sig": ["0x<65-byte signature>", ...],
//!   "app_session_id": string (optional)
//! }
//! ```
//!
//! ## Security Properties
//!
//! - **Half-scoped signatures**: a signature covers the canonical bytes of one
//!   half only ([`RpcData::canonical_bytes`]), never the whole envelope.
//! - **Canonical form**: fields are serialized in declaration order and nested
//!   JSON objects with sorted keys, so re-serializing a parsed half reproduces
//!   the bytes a compliant client signed.
//! - **Relay marker**: a non-empty `app_session_id` marks session relay traffic.

use crate::errors::EnvelopeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One half of an envelope (request or response).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcData {
    pub request_id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    /// Unix epoch milliseconds.
    pub timestamp: u64,
}

impl RpcData {
    pub fn new(
        request_id: u64,
        method: impl Into<String>,
        params: Vec<Value>,
        timestamp: u64,
    ) -> Self {
        Self {
            request_id,
            method: method.into(),
            params,
            timestamp,
        }
    }

    /// The exact bytes signatures over this half are computed on.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// The wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcMessage {
    #[serde(default)]
    pub req: Option<RpcData>,
    #[serde(default)]
    pub res: Option<RpcData>,
    #[serde(default)]
    pub sig: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_session_id: Option<String>,
}

impl RpcMessage {
    /// Outbound frame carrying only a response half.
    pub fn response(res: RpcData, sig: Vec<String>) -> Self {
        Self {
            req: None,
            res: Some(res),
            sig,
            app_session_id: None,
        }
    }

    /// Inbound-style frame carrying only a request half.
    pub fn request(req: RpcData, sig: Vec<String>) -> Self {
        Self {
            req: Some(req),
            res: None,
            sig,
            app_session_id: None,
        }
    }

    /// Deserialize and structurally validate a raw frame.
    ///
    /// An empty `app_session_id` is treated as absent.
    pub fn parse(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let mut msg: RpcMessage = serde_json::from_slice(bytes)
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        if msg.app_session_id.as_deref() == Some("") {
            msg.app_session_id = None;
        }
        msg.validate()?;
        Ok(msg)
    }

    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.req.is_none() && self.res.is_none() {
            return Err(EnvelopeError::Empty);
        }
        for half in [&self.req, &self.res].into_iter().flatten() {
            if half.method.trim().is_empty() {
                return Err(EnvelopeError::EmptyMethod);
            }
        }
        Ok(())
    }

    /// The half relay signatures are checked against: request if present,
    /// otherwise response.
    pub fn payload(&self) -> Option<&RpcData> {
        self.req.as_ref().or(self.res.as_ref())
    }

    pub fn is_relay(&self) -> bool {
        self.app_session_id.is_some()
    }
}

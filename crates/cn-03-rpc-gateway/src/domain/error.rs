//! Gateway error types with JSON-RPC style error codes.
//!
//! The wire error frame only carries the message (`[{"error": "..."}]`); the
//! numeric code is used for logs and metrics.

use crate::auth::AuthError;
use cn_02_ledger::LedgerError;
use shared_types::{EnvelopeError, SessionError, StorageError};

/// Error codes, JSON-RPC 2.0 numbering.
pub mod codes {
    // JSON-RPC 2.0 standard errors (-32700 to -32600)
    pub const PARSE_ERROR: i32 = -32700;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Server errors (-32000 to -32099)
    pub const RESOURCE_NOT_FOUND: i32 = -32001;
    pub const STORAGE_ERROR: i32 = -32002;
    pub const TIMESTAMP_REJECTED: i32 = -32003;

    pub const UNAUTHENTICATED: i32 = -32010;
    pub const UNAUTHORIZED: i32 = -32011;
}

/// Everything that can go wrong while serving one frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// Malformed or unparseable frame.
    #[error("{0}")]
    Protocol(String),

    /// Bad signature, challenge failure, missing or invalid address.
    #[error("{0}")]
    Auth(String),

    /// Valid signature, but the signer may not perform the action.
    #[error("unauthorized: {0}")]
    Authorization(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Stale or malformed timestamp.
    #[error("message timestamp validation failed: {0}")]
    Timestamp(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The node could not serialize or sign its own frame.
    #[error("signing failed: {0}")]
    Signing(String),
}

impl RpcError {
    pub fn code(&self) -> i32 {
        match self {
            RpcError::Protocol(_) => codes::PARSE_ERROR,
            RpcError::Auth(_) => codes::UNAUTHENTICATED,
            RpcError::Authorization(_) => codes::UNAUTHORIZED,
            RpcError::NotFound(_) => codes::RESOURCE_NOT_FOUND,
            RpcError::Timestamp(_) => codes::TIMESTAMP_REJECTED,
            RpcError::Storage(_) => codes::STORAGE_ERROR,
            RpcError::UnsupportedMethod(_) => codes::METHOD_NOT_FOUND,
            RpcError::InvalidParams(_) => codes::INVALID_PARAMS,
            RpcError::Signing(_) => codes::INTERNAL_ERROR,
        }
    }

    pub fn invalid_params(details: impl Into<String>) -> Self {
        RpcError::InvalidParams(details.into())
    }
}

impl From<EnvelopeError> for RpcError {
    fn from(e: EnvelopeError) -> Self {
        RpcError::Protocol(e.to_string())
    }
}

impl From<AuthError> for RpcError {
    fn from(e: AuthError) -> Self {
        RpcError::Auth(e.to_string())
    }
}

impl From<StorageError> for RpcError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => RpcError::NotFound(what),
            other => RpcError::Storage(other.to_string()),
        }
    }
}

impl From<LedgerError> for RpcError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvalidInput(details) => RpcError::InvalidParams(details),
            precision @ LedgerError::Precision { .. } => {
                RpcError::InvalidParams(precision.to_string())
            }
            other => RpcError::Storage(other.to_string()),
        }
    }
}

impl From<SessionError> for RpcError {
    fn from(e: SessionError) -> Self {
        RpcError::InvalidParams(e.to_string())
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::InvalidParams(e.to_string())
    }
}

/// Gateway-level errors (start-up and serving, not per frame).
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server bind error: {0}")]
    Bind(String),

    #[error("server error: {0}")]
    Serve(String),

    #[error("invalid node key: {0}")]
    Signer(String),
}

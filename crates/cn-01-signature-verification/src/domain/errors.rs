//! # Signature Errors
//!
//! Error types for signing and recovery.

use thiserror::Error;

/// Errors that can occur while signing or recovering signatures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// The signature is not valid hex.
    #[error("Invalid signature encoding: {0}")]
    InvalidEncoding(String),

    /// The signature is not 65 bytes.
    #[error("Invalid signature length: expected 65 bytes, got {0}")]
    InvalidLength(usize),

    /// R or S is outside [1, n-1].
    #[error("Invalid signature format")]
    InvalidFormat,

    /// Signature has high S value (EIP-2 malleability protection)
    #[error("Malleable signature (high S value)")]
    MalleableSignature,

    /// Invalid recovery ID (v must be 0, 1, 27, or 28)
    #[error("Invalid recovery ID: {0}")]
    InvalidRecoveryId(u8),

    /// Failed to recover public key from signature
    #[error("Failed to recover public key")]
    RecoveryFailed,

    /// The node key could not be loaded.
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Signing the digest failed.
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

//! # Error Types
//!
//! Error types shared across crates.

use thiserror::Error;

/// Errors produced while parsing an [`Address`](crate::Address).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Input is not 40 hex characters (after an optional `0x`).
    #[error("invalid address length: expected 40 hex characters, got {0}")]
    InvalidLength(usize),

    /// Input contains non-hex characters.
    #[error("invalid address encoding: {0}")]
    InvalidHex(String),
}

/// Structural problems with an inbound RPC frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Frame is not valid JSON or does not match the envelope schema.
    #[error("invalid message format: {0}")]
    Malformed(String),

    /// Neither a request nor a response half is present.
    #[error("message carries neither a request nor a response")]
    Empty,

    /// A half is present but its method is empty.
    #[error("method must not be empty")]
    EmptyMethod,
}

/// Violations of the application session invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A session needs at least one participant.
    #[error("session must have at least one participant")]
    NoParticipants,

    /// Participants and weights must be parallel lists.
    #[error("participants ({participants}) and weights ({weights}) differ in length")]
    WeightsMismatch { participants: usize, weights: usize },

    /// The same address appears twice.
    #[error("duplicate participant {0}")]
    DuplicateParticipant(String),

    /// Quorum can never be reached.
    #[error("quorum {quorum} exceeds total weight {total}")]
    QuorumUnreachable { quorum: u64, total: u64 },
}

/// Errors from persistence ports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record with the same key already exists.
    #[error("already exists: {0}")]
    Conflict(String),

    /// Backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

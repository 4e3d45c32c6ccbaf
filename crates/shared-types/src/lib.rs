//! # Shared Types Crate
//!
//! Entities and the RPC envelope used by every clearnode crate.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: wire-visible types are defined here once.
//! - **Typed Identity**: participant identity is an [`Address`] (20 bytes),
//!   compared byte-wise. String forms only exist at the serialization edge.
//! - **Signed Halves**: the [`RpcMessage`] envelope carries a request half and/or a
//!   response half; signatures always cover the canonical bytes of one half.

pub mod entities;
pub mod envelope;
pub mod errors;

pub use entities::*;
pub use envelope::{RpcData, RpcMessage};
pub use errors::*;

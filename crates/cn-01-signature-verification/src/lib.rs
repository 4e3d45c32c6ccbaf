//! # Signature Verification (CN-01)
//!
//! Identity layer of the clearnode: turns a payload plus a recoverable
//! secp256k1 signature into the signer's [`Address`], and signs the node's own
//! outbound frames.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): pure cryptographic logic, no I/O
//! - **Ports Layer** (`ports/`): the [`Signer`] trait consumed by the gateway
//!
//! ## Scheme
//!
//! `digest = keccak256(payload)`; signature = `r || s || v` (65 bytes, hex with
//! `0x`). `v` is accepted as 0, 1, 27 or 28 and produced as 27 or 28.
//!
//! ## Security Notes
//!
//! - **Malleability Prevention (EIP-2)**: signatures with high S values are rejected
//! - **Determinism**: the same payload and signature always recover the same
//!   address, independent of process state

pub mod domain;
pub mod ports;

pub use domain::ecdsa::{
    address_from_pubkey, keccak256, recover, recover_address, verify, EcdsaSigner,
};
pub use domain::entities::{EcdsaSignature, Hash};
pub use domain::errors::SignatureError;
pub use ports::inbound::Signer;
pub use shared_types::Address;

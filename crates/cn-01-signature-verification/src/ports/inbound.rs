//! # Inbound Ports (Driving Ports / API)
//!
//! The signing identity the gateway uses for every outbound frame.

use crate::domain::entities::EcdsaSignature;
use crate::domain::errors::SignatureError;
use shared_types::Address;

/// Server-side signer.
///
/// Implementations must be thread-safe (`Send + Sync`); the gateway shares one
/// signer across all connection loops.
pub trait Signer: Send + Sync {
    /// Address of the signing key.
    fn address(&self) -> Address;

    /// Sign the canonical bytes of an outbound half.
    fn sign(&self, payload: &[u8]) -> Result<EcdsaSignature, SignatureError>;
}

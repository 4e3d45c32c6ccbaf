//! # ECDSA (secp256k1)
//!
//! Pure domain logic for recoverable signatures over keccak256 digests.
//!
//! ## Security Notes
//!
//! - **Malleability Prevention (EIP-2)**: S must be STRICTLY LESS THAN SECP256K1_HALF_ORDER
//! - **Scalar Range Validation**: R and S must be in [1, n-1]
//! - **Constant-Time Operations**: Uses `subtle` crate for side-channel resistance
//! - Uses k256 crate for cryptographic operations

use super::entities::{EcdsaSignature, Hash};
use super::errors::SignatureError;
use crate::ports::inbound::Signer;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use shared_types::Address;
use std::fmt;
use subtle::{Choice, ConstantTimeEq};
use tracing::debug;
use zeroize::Zeroize;

/// secp256k1 curve order n
/// n = 0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141
const SECP256K1_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// Half of the secp256k1 curve order (for malleability check).
const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

// =============================================================================
// PAYLOAD-LEVEL API
// =============================================================================

/// Recover the signer of `payload` from a hex-encoded signature.
///
/// Fails only for malformed input; any well-formed signature recovers *some*
/// address.
pub fn recover(payload: &[u8], signature_hex: &str) -> Result<Address, SignatureError> {
    let signature: EcdsaSignature = signature_hex.parse()?;
    recover_address(&keccak256(payload), &signature)
}

/// Check that `signature_hex` over `payload` was produced by `expected`.
///
/// A mismatch is `Ok(false)`; only malformed signatures are errors.
pub fn verify(
    payload: &[u8],
    signature_hex: &str,
    expected: &Address,
) -> Result<bool, SignatureError> {
    let recovered = recover(payload, signature_hex)?;
    Ok(recovered.as_bytes().ct_eq(expected.as_bytes()).into())
}

// =============================================================================
// DIGEST-LEVEL API
// =============================================================================

/// Recover the signer's address from a signature over `message_hash`.
pub fn recover_address(
    message_hash: &Hash,
    signature: &EcdsaSignature,
) -> Result<Address, SignatureError> {
    if !is_valid_scalar(&signature.r) || !is_valid_scalar(&signature.s) {
        return Err(SignatureError::InvalidFormat);
    }
    if !is_low_s(&signature.s) {
        debug!(v = signature.v, "Rejected high-S signature");
        return Err(SignatureError::MalleableSignature);
    }

    let recovery_id = parse_recovery_id(signature.v)?;

    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(&signature.r);
    sig_bytes[32..].copy_from_slice(&signature.s);
    let sig = Signature::from_slice(&sig_bytes);
    sig_bytes.zeroize();
    let sig = sig.map_err(|_| SignatureError::InvalidFormat)?;

    let recovered_key = VerifyingKey::recover_from_prehash(message_hash, &sig, recovery_id)
        .map_err(|e| {
            debug!(error = %e, "Public key recovery failed");
            SignatureError::RecoveryFailed
        })?;

    Ok(address_from_pubkey(&recovered_key))
}

/// Keccak256 hash function.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Derive the network address from a public key.
pub fn address_from_pubkey(public_key: &VerifyingKey) -> Address {
    let pubkey_bytes = public_key.to_encoded_point(false);
    let pubkey_slice = pubkey_bytes.as_bytes();

    // Keccak256 of the uncompressed key without the 0x04 prefix; last 20 bytes
    let hash = keccak256(&pubkey_slice[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Address::from_bytes(address)
}

// =============================================================================
// NODE SIGNER
// =============================================================================

/// The node's own signing identity.
pub struct EcdsaSigner {
    signing_key: SigningKey,
    address: Address,
}

impl EcdsaSigner {
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = address_from_pubkey(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// Load from a 32-byte hex private key (with or without `0x`).
    pub fn from_hex(private_key: &str) -> Result<Self, SignatureError> {
        let digits = private_key.trim().strip_prefix("0x").unwrap_or(private_key.trim());
        let mut bytes = hex::decode(digits).map_err(|_| SignatureError::InvalidPrivateKey)?;
        let key = SigningKey::from_slice(&bytes);
        bytes.zeroize();
        key.map(Self::from_signing_key)
            .map_err(|_| SignatureError::InvalidPrivateKey)
    }

    /// Sign a precomputed digest, normalized to low S.
    pub fn sign_hash(&self, message_hash: &Hash) -> Result<EcdsaSignature, SignatureError> {
        let (sig, recid) = self
            .signing_key
            .sign_prehash_recoverable(message_hash)
            .map_err(|e| SignatureError::SigningFailed(e.to_string()))?;

        let sig_bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&sig_bytes[..32]);
        s.copy_from_slice(&sig_bytes[32..]);

        // Inverting S flips the parity of the recovered point
        let (s, parity) = if is_low_s(&s) {
            (s, recid.to_byte() & 1)
        } else {
            (invert_s(&s), (recid.to_byte() & 1) ^ 1)
        };

        Ok(EcdsaSignature { r, s, v: parity + 27 })
    }
}

impl Signer for EcdsaSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign(&self, payload: &[u8]) -> Result<EcdsaSignature, SignatureError> {
        self.sign_hash(&keccak256(payload))
    }
}

impl fmt::Debug for EcdsaSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdsaSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Check if S value is in lower half of curve order (EIP-2 malleability protection).
///
/// Per EIP-2: S must be STRICTLY LESS THAN half_order (not equal).
/// Runs in fixed time regardless of input values.
fn is_low_s(s: &[u8; 32]) -> bool {
    let mut less = Choice::from(0u8);
    let mut greater = Choice::from(0u8);

    for i in 0..32 {
        let s_byte = s[i];
        let h_byte = SECP256K1_HALF_ORDER[i];

        let not_decided = !(less | greater);
        let byte_less = Choice::from((s_byte < h_byte) as u8);
        let byte_greater = Choice::from((s_byte > h_byte) as u8);

        less |= not_decided & byte_less;
        greater |= not_decided & byte_greater;
    }

    less.into()
}

/// Check if a scalar value is in valid range [1, n-1] for ECDSA.
fn is_valid_scalar(scalar: &[u8; 32]) -> bool {
    let mut is_zero = Choice::from(1u8);
    for &byte in scalar {
        is_zero &= byte.ct_eq(&0u8);
    }

    let mut less = Choice::from(0u8);
    let mut greater = Choice::from(0u8);

    for i in 0..32 {
        let s_byte = scalar[i];
        let n_byte = SECP256K1_ORDER[i];

        let not_decided = !(less | greater);
        let byte_less = Choice::from((s_byte < n_byte) as u8);
        let byte_greater = Choice::from((s_byte > n_byte) as u8);

        less |= not_decided & byte_less;
        greater |= not_decided & byte_greater;
    }

    (!is_zero & less).into()
}

/// Parse recovery ID from v value.
///
/// Valid v values: 0, 1, 27, 28
fn parse_recovery_id(v: u8) -> Result<RecoveryId, SignatureError> {
    let id = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => return Err(SignatureError::InvalidRecoveryId(v)),
    };

    RecoveryId::try_from(id).map_err(|_| SignatureError::InvalidRecoveryId(v))
}

/// s' = n - s
fn invert_s(s: &[u8; 32]) -> [u8; 32] {
    let mut result = [0u8; 32];
    let mut borrow: i32 = 0;

    for i in (0..32).rev() {
        let diff = (SECP256K1_ORDER[i] as i32) - (s[i] as i32) - borrow;
        if diff < 0 {
            result[i] = (diff + 256) as u8;
            borrow = 1;
        } else {
            result[i] = diff as u8;
            borrow = 0;
        }
    }

    result
}

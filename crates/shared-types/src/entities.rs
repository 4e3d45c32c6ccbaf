//! # Domain Entities
//!
//! Participant addresses, application sessions, payment channels and assets.

use crate::errors::{AddressError, SessionError};
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{serde_as, DisplayFromStr};
use sha3::{Digest, Keccak256};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Address
// =============================================================================

/// 20-byte network address (last 20 bytes of keccak256 of the public key).
///
/// Parses with or without a `0x` prefix, in any letter case. Displays and
/// serializes as `0x`-prefixed EIP-55 checksummed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// Address length in bytes.
    pub const LEN: usize = 20;

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// EIP-55 mixed-case checksum encoding.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = Keccak256::digest(lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 {
                hash[i / 2] >> 4
            } else {
                hash[i / 2] & 0x0f
            };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }

    /// True if `s` is a well-formed address string.
    pub fn is_valid(s: &str) -> bool {
        s.parse::<Address>().is_ok()
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.len() != 40 {
            return Err(AddressError::InvalidLength(digits.len()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// =============================================================================
// Status
// =============================================================================

/// Lifecycle status shared by channels and application sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    /// Created on-chain, waiting for the node to join.
    Joining,
    Open,
    /// A dispute is in progress on-chain.
    Challenged,
    Closed,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Joining => "joining",
            ChannelStatus::Open => "open",
            ChannelStatus::Challenged => "challenged",
            ChannelStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "joining" => Ok(ChannelStatus::Joining),
            "open" => Ok(ChannelStatus::Open),
            "challenged" => Ok(ChannelStatus::Challenged),
            "closed" => Ok(ChannelStatus::Closed),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

// =============================================================================
// Application session
// =============================================================================

/// Default protocol tag for application sessions.
pub const DEFAULT_PROTOCOL: &str = "NitroRPC/0.2";

/// A multi-party shared session with weighted participants.
///
/// Invariants (checked by [`AppSession::validate_definition`]):
/// - at least one participant, all distinct
/// - `participants.len() == weights.len()`
/// - `quorum <= sum(weights)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSession {
    pub session_id: String,
    pub protocol: String,
    pub challenge: u64,
    pub nonce: u64,
    pub version: u64,
    pub participants: Vec<Address>,
    pub weights: Vec<u64>,
    pub quorum: u64,
    pub status: ChannelStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppSession {
    /// Build a new open session at version 1.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: impl Into<String>,
        protocol: impl Into<String>,
        participants: Vec<Address>,
        weights: Vec<u64>,
        quorum: u64,
        challenge: u64,
        nonce: u64,
    ) -> Result<Self, SessionError> {
        Self::validate_definition(&participants, &weights, quorum)?;
        let now = Utc::now();
        Ok(Self {
            session_id: session_id.into(),
            protocol: protocol.into(),
            challenge,
            nonce,
            version: 1,
            participants,
            weights,
            quorum,
            status: ChannelStatus::Open,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn validate_definition(
        participants: &[Address],
        weights: &[u64],
        quorum: u64,
    ) -> Result<(), SessionError> {
        if participants.is_empty() {
            return Err(SessionError::NoParticipants);
        }
        if participants.len() != weights.len() {
            return Err(SessionError::WeightsMismatch {
                participants: participants.len(),
                weights: weights.len(),
            });
        }
        let mut seen = HashSet::with_capacity(participants.len());
        for p in participants {
            if !seen.insert(*p) {
                return Err(SessionError::DuplicateParticipant(p.to_string()));
            }
        }
        let total = weights.iter().fold(0u64, |acc, w| acc.saturating_add(*w));
        if quorum > total {
            return Err(SessionError::QuorumUnreachable { quorum, total });
        }
        Ok(())
    }

    pub fn is_participant(&self, address: &Address) -> bool {
        self.participants.contains(address)
    }

    /// Weight of `address`, or `None` if it is not a participant.
    pub fn weight_of(&self, address: &Address) -> Option<u64> {
        self.participants
            .iter()
            .position(|p| p == address)
            .map(|i| self.weights[i])
    }

    /// Summed weight of the distinct participants among `signers`.
    pub fn signed_weight<'a>(&self, signers: impl IntoIterator<Item = &'a Address>) -> u64 {
        let unique: HashSet<&Address> = signers.into_iter().collect();
        unique
            .into_iter()
            .filter_map(|a| self.weight_of(a))
            .fold(0u64, |acc, w| acc.saturating_add(w))
    }
}

// =============================================================================
// Channel
// =============================================================================

/// Snapshot of a participant's payment channel with the node.
///
/// `amount` is in raw token units and travels as a decimal string.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: String,
    pub participant: Address,
    pub status: ChannelStatus,
    pub token: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub amount: u128,
    pub chain_id: u32,
    pub adjudicator: Address,
    pub challenge: u64,
    pub nonce: u64,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Asset
// =============================================================================

/// A token the node clears, keyed by `(token, chain_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub token: Address,
    pub chain_id: u32,
    pub symbol: String,
    pub decimals: u32,
}

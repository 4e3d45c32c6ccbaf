//! # Domain Entities
//!
//! Ledger entries, account classification and balances.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared_types::Address;

/// Kind of account an entry belongs to, derived from its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// A participant's own funds, keyed by a 20-byte address.
    Wallet,
    /// Funds locked in an application session, keyed by a 32-byte session id.
    AppSession,
    Other,
}

impl AccountType {
    pub fn classify(account_id: &str) -> Self {
        let digits = account_id.strip_prefix("0x").unwrap_or(account_id);
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return AccountType::Other;
        }
        match digits.len() {
            40 => AccountType::Wallet,
            64 => AccountType::AppSession,
            _ => AccountType::Other,
        }
    }
}

/// One immutable accounting fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Store-assigned, strictly increasing.
    pub id: u64,
    pub account_id: String,
    pub account_type: AccountType,
    pub asset_symbol: String,
    pub participant: Address,
    #[serde(deserialize_with = "super::amount::deserialize")]
    pub credit: Decimal,
    #[serde(deserialize_with = "super::amount::deserialize")]
    pub debit: Decimal,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// `credit - debit`
    pub fn net(&self) -> Decimal {
        self.credit - self.debit
    }
}

/// An entry before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub account_id: String,
    pub account_type: AccountType,
    pub asset_symbol: String,
    pub participant: Address,
    pub credit: Decimal,
    pub debit: Decimal,
    pub created_at: DateTime<Utc>,
}

impl NewEntry {
    /// Build the entry for a signed movement; `None` for a zero amount.
    pub fn from_amount(
        participant: Address,
        account_id: &str,
        asset_symbol: &str,
        amount: Decimal,
    ) -> Option<Self> {
        let (credit, debit) = if amount.is_sign_positive() && !amount.is_zero() {
            (amount, Decimal::ZERO)
        } else if amount.is_sign_negative() && !amount.is_zero() {
            (Decimal::ZERO, amount.abs())
        } else {
            return None;
        };

        Some(Self {
            account_id: account_id.to_string(),
            account_type: AccountType::classify(account_id),
            asset_symbol: asset_symbol.to_string(),
            participant,
            credit,
            debit,
            created_at: Utc::now(),
        })
    }

    pub fn into_entry(self, id: u64) -> LedgerEntry {
        LedgerEntry {
            id,
            account_id: self.account_id,
            account_type: self.account_type,
            asset_symbol: self.asset_symbol,
            participant: self.participant,
            credit: self.credit,
            debit: self.debit,
            created_at: self.created_at,
        }
    }
}

/// Balance of one asset in one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    #[serde(deserialize_with = "super::amount::deserialize")]
    pub amount: Decimal,
}

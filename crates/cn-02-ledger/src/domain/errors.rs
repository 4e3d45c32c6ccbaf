//! # Ledger Errors

use thiserror::Error;

/// Errors raised by ledger operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Account identifier or asset symbol is empty.
    #[error("invalid ledger input: {0}")]
    InvalidInput(String),

    /// A sum left the representable decimal range.
    #[error("balance overflow for account {account_id} asset {asset}")]
    Overflow { account_id: String, asset: String },

    /// The balance would need more digits than the decimal type keeps.
    #[error("balance of account {account_id} asset {asset} exceeds the supported precision")]
    Precision { account_id: String, asset: String },

    /// The backing store failed.
    #[error("ledger storage error: {0}")]
    Storage(String),
}

//! # Ledger (CN-02)
//!
//! Append-only, per-participant double-entry accounting.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): entries, account types, balance arithmetic
//! - **Ports Layer** (`ports/`): the [`LedgerStore`] persistence interface
//! - **Adapters** (`adapters/`): [`InMemoryLedgerStore`]
//! - **Service** (`service.rs`): [`Ledger`] and its per-participant view
//!   [`ParticipantLedger`]
//!
//! ## Invariants
//!
//! - Entries are immutable and never deleted; corrections are new entries.
//! - Every entry has exactly one strictly positive side (credit or debit).
//! - Balances are recomputed from the entry log on every query; there is no
//!   balance cache to drift.
//! - A movement whose resulting balance the decimal type cannot hold exactly
//!   is refused before it is written.
//! - Amounts are exact base-10 decimals; binary floating point is never used.
//!   Input with more digits than [`Decimal`] keeps is rejected by
//!   [`amount::parse_exact`] rather than rounded.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::InMemoryLedgerStore;
pub use domain::amount::{
    self, exact_add, exact_sub, parse_exact, AmountError, ArithmeticError,
};
pub use domain::entities::{AccountType, Balance, LedgerEntry, NewEntry};
pub use domain::errors::LedgerError;
pub use ports::outbound::{EntryFilter, LedgerStore};
pub use rust_decimal::Decimal;
pub use service::{Ledger, ParticipantLedger};

//! # Outbound Ports (Driven Ports)
//!
//! Persistence required by the ledger service.

use crate::domain::entities::{LedgerEntry, NewEntry};
use crate::domain::errors::LedgerError;
use shared_types::Address;

/// Selects the entries of one participant's account, optionally one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFilter {
    pub participant: Address,
    pub account_id: String,
    pub asset_symbol: Option<String>,
}

/// Append-only entry log.
///
/// Production stores put this behind a database table with an
/// `(account_id, asset_symbol)` and an `(account_id, participant)` index.
/// Testing and single-process deployments use `InMemoryLedgerStore`.
pub trait LedgerStore: Send + Sync {
    /// Append an entry, assigning the next id. Never overwrites.
    fn append(&self, entry: NewEntry) -> Result<LedgerEntry, LedgerError>;

    /// Matching entries in ascending id order.
    fn entries(&self, filter: &EntryFilter) -> Result<Vec<LedgerEntry>, LedgerError>;
}

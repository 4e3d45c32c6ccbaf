//! # In-Memory Ledger Store

use crate::domain::entities::{LedgerEntry, NewEntry};
use crate::domain::errors::LedgerError;
use crate::ports::outbound::{EntryFilter, LedgerStore};
use parking_lot::RwLock;

/// Entry log held in a vector; ids are positions plus one.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    entries: RwLock<Vec<LedgerEntry>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entries across all accounts.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn append(&self, entry: NewEntry) -> Result<LedgerEntry, LedgerError> {
        let mut entries = self.entries.write();
        let id = entries.len() as u64 + 1;
        let stored = entry.into_entry(id);
        entries.push(stored.clone());
        Ok(stored)
    }

    fn entries(&self, filter: &EntryFilter) -> Result<Vec<LedgerEntry>, LedgerError> {
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .filter(|e| e.participant == filter.participant)
            .filter(|e| e.account_id == filter.account_id)
            .filter(|e| {
                filter
                    .asset_symbol
                    .as_deref()
                    .map_or(true, |asset| e.asset_symbol == asset)
            })
            .cloned()
            .collect())
    }
}

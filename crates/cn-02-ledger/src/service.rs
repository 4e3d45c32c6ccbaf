//! # Ledger Service
//!
//! [`Ledger`] owns the store; [`ParticipantLedger`] is the view bound to one
//! participant through which every record and query flows.

use crate::adapters::InMemoryLedgerStore;
use crate::domain::amount::{exact_add, exact_sub, ArithmeticError};
use crate::domain::entities::{Balance, LedgerEntry, NewEntry};
use crate::domain::errors::LedgerError;
use crate::ports::outbound::{EntryFilter, LedgerStore};
use rust_decimal::Decimal;
use shared_types::Address;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Shared handle to the entry log.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryLedgerStore::new()))
    }

    /// Bind the ledger to one participant.
    pub fn participant(&self, participant: Address) -> ParticipantLedger {
        ParticipantLedger {
            participant,
            store: Arc::clone(&self.store),
        }
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}

/// Ledger operations scoped to a single participant.
pub struct ParticipantLedger {
    participant: Address,
    store: Arc<dyn LedgerStore>,
}

impl ParticipantLedger {
    pub fn participant(&self) -> Address {
        self.participant
    }

    /// Record a signed movement on `account_id`.
    ///
    /// Positive amounts are credits, negative amounts debits. A zero amount
    /// writes nothing and returns `Ok(None)`. The movement is refused when the
    /// resulting balance could not be represented exactly.
    pub fn record(
        &self,
        account_id: &str,
        asset_symbol: &str,
        amount: Decimal,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        validate_key(account_id, asset_symbol)?;

        let Some(entry) = NewEntry::from_amount(self.participant, account_id, asset_symbol, amount)
        else {
            return Ok(None);
        };
        let current = self.balance(account_id, asset_symbol)?;
        exact_add(current, amount).map_err(|e| arithmetic_error(e, account_id, asset_symbol))?;

        let stored = self.store.append(entry)?;
        debug!(
            participant = %self.participant,
            account_id,
            asset = asset_symbol,
            credit = %stored.credit,
            debit = %stored.debit,
            entry_id = stored.id,
            "Ledger entry recorded"
        );
        Ok(Some(stored))
    }

    /// Σcredit − Σdebit for one asset; zero when no entries exist.
    pub fn balance(&self, account_id: &str, asset_symbol: &str) -> Result<Decimal, LedgerError> {
        validate_key(account_id, asset_symbol)?;
        let entries = self.store.entries(&self.filter(account_id, Some(asset_symbol)))?;
        sum_entries(account_id, asset_symbol, &entries)
    }

    /// One balance per asset that has entries, sorted by asset symbol.
    pub fn balances(&self, account_id: &str) -> Result<Vec<Balance>, LedgerError> {
        if account_id.is_empty() {
            return Err(LedgerError::InvalidInput("empty account id".into()));
        }
        let entries = self.store.entries(&self.filter(account_id, None))?;

        let mut grouped: BTreeMap<&str, Vec<&LedgerEntry>> = BTreeMap::new();
        for entry in &entries {
            grouped.entry(entry.asset_symbol.as_str()).or_default().push(entry);
        }

        grouped
            .into_iter()
            .map(|(asset, entries)| {
                let amount = sum_entries(account_id, asset, entries.iter().copied())?;
                Ok(Balance {
                    asset: asset.to_string(),
                    amount,
                })
            })
            .collect()
    }

    /// Entries of the account in insertion order, optionally one asset.
    pub fn entries(
        &self,
        account_id: &str,
        asset_symbol: Option<&str>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        if account_id.is_empty() {
            return Err(LedgerError::InvalidInput("empty account id".into()));
        }
        let mut entries = self.store.entries(&self.filter(account_id, asset_symbol))?;
        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }

    fn filter(&self, account_id: &str, asset_symbol: Option<&str>) -> EntryFilter {
        EntryFilter {
            participant: self.participant,
            account_id: account_id.to_string(),
            asset_symbol: asset_symbol.map(str::to_string),
        }
    }
}

fn validate_key(account_id: &str, asset_symbol: &str) -> Result<(), LedgerError> {
    if account_id.is_empty() {
        return Err(LedgerError::InvalidInput("empty account id".into()));
    }
    if asset_symbol.is_empty() {
        return Err(LedgerError::InvalidInput("empty asset symbol".into()));
    }
    Ok(())
}

fn sum_entries<'a>(
    account_id: &str,
    asset: &str,
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
) -> Result<Decimal, LedgerError> {
    entries.into_iter().try_fold(Decimal::ZERO, |acc, e| {
        exact_add(acc, e.credit)
            .and_then(|v| exact_sub(v, e.debit))
            .map_err(|err| arithmetic_error(err, account_id, asset))
    })
}

fn arithmetic_error(err: ArithmeticError, account_id: &str, asset: &str) -> LedgerError {
    let (account_id, asset) = (account_id.to_string(), asset.to_string());
    match err {
        ArithmeticError::Overflow => LedgerError::Overflow { account_id, asset },
        ArithmeticError::Inexact => LedgerError::Precision { account_id, asset },
    }
}

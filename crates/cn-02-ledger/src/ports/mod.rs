//! Ports layer for the ledger.

pub mod outbound;

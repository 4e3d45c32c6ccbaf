//! Domain layer for the ledger.

pub mod amount;
pub mod entities;
pub mod errors;

//! Storage adapters implementing [`LedgerStore`](crate::ports::outbound::LedgerStore).

mod memory;

pub use memory::InMemoryLedgerStore;

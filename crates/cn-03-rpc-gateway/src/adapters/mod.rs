//! Adapters implementing the gateway's outbound ports.

mod clock;
mod memory;

pub use clock::ManualClock;
pub use memory::{InMemoryAppSessionStore, InMemoryChannelStore, InMemoryRpcHistoryStore};

//! # Clearnode Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/
//! │   ├── harness.rs      # In-process node and channel-backed clients
//! │   └── integration/    # End-to-end protocol scenarios
//! │       ├── auth_flow.rs
//! │       ├── relay.rs
//! │       └── ledger_flow.rs
//! └── benches/            # Criterion benchmarks
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p cn-tests
//! cargo test -p cn-tests integration::relay
//! cargo bench -p cn-tests
//! ```

pub mod harness;
pub mod integration;

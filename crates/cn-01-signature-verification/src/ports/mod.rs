//! Ports layer for signature verification.

pub mod inbound;

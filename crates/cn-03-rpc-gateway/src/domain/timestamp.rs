//! Request timestamp rules.
//!
//! A request timestamp is a Unix epoch value in milliseconds with exactly 13
//! digits and must not be older than the configured expiry window. Relay
//! traffic is exempt.

use super::error::RpcError;
use std::time::Duration;

/// Smallest 13-digit value (2001-09-09T01:46:40Z).
pub const MIN_TIMESTAMP_MS: u64 = 1_000_000_000_000;
/// Largest 13-digit value (2286-11-20T17:46:39.999Z).
pub const MAX_TIMESTAMP_MS: u64 = 9_999_999_999_999;

pub fn validate_timestamp(ts: u64, now_ms: u64, expiry: Duration) -> Result<(), RpcError> {
    if !(MIN_TIMESTAMP_MS..=MAX_TIMESTAMP_MS).contains(&ts) {
        return Err(RpcError::Timestamp(format!(
            "invalid timestamp {ts}: must be 13-digit Unix ms"
        )));
    }

    let expiry_ms = millis(expiry);
    let age_ms = now_ms.saturating_sub(ts);
    if age_ms > expiry_ms {
        return Err(RpcError::Timestamp(format!(
            "timestamp expired: {ts} older than {} s",
            expiry.as_secs()
        )));
    }
    Ok(())
}

/// Whole milliseconds of `d`, saturating at `u64::MAX`.
pub fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

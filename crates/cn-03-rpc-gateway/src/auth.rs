//! # Auth Manager
//!
//! Per-address challenge/response state machine:
//!
//! ```text
//! (none) ──generate_challenge──→ Challenged ──validate_challenge──→ Authenticated
//!                                    │                                   │
//!                               TTL elapsed                      idle > session_timeout
//!                                    ↓                                   ↓
//!                                 expired                             expired
//! ```
//!
//! A pending challenge and an authenticated session are tracked side by side:
//! issuing a challenge for an address never disturbs a live session of that
//! address, only the challenge it replaces.
//!
//! State lives in a `DashMap` keyed by address; every operation holds the
//! shard lock for its key, so operations on one address are atomic and
//! different addresses do not block each other.

use crate::ports::Clock;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use shared_types::Address;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("challenge mismatch")]
    ChallengeMismatch,

    #[error("challenge expired")]
    ChallengeExpired,

    #[error("challenge already consumed")]
    ChallengeAlreadyConsumed,
}

#[derive(Debug, Clone, Copy)]
struct Challenge {
    token: Uuid,
    issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Session {
    /// The token that produced this session; replaying it is reported
    /// as consumed rather than mismatched.
    consumed_token: Uuid,
    last_activity: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct AuthState {
    pending: Option<Challenge>,
    session: Option<Session>,
}

impl AuthState {
    fn is_empty(&self) -> bool {
        self.pending.is_none() && self.session.is_none()
    }
}

pub struct AuthManager {
    states: DashMap<Address, AuthState>,
    challenge_ttl: chrono::Duration,
    session_timeout: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl AuthManager {
    pub fn new(challenge_ttl: Duration, session_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: DashMap::new(),
            challenge_ttl: to_chrono(challenge_ttl),
            session_timeout: to_chrono(session_timeout),
            clock,
        }
    }

    /// Issue a fresh single-use token for `address`, replacing any pending
    /// challenge it had. An existing session is left untouched.
    pub fn generate_challenge(&self, address: &str) -> Result<Uuid, AuthError> {
        let address: Address = address
            .trim()
            .parse()
            .map_err(|_| AuthError::InvalidAddress(address.to_string()))?;

        let token = Uuid::new_v4();
        self.states.entry(address).or_default().pending = Some(Challenge {
            token,
            issued_at: self.clock.now(),
        });
        debug!(address = %address, "Challenge issued");
        Ok(token)
    }

    /// Consume the pending challenge of `address` if `token` matches.
    pub fn validate_challenge(&self, token: &str, address: &Address) -> Result<(), AuthError> {
        let presented = Uuid::parse_str(token.trim()).map_err(|_| AuthError::ChallengeMismatch)?;
        let now = self.clock.now();

        let mut entry = self
            .states
            .get_mut(address)
            .ok_or(AuthError::ChallengeMismatch)?;

        if let Some(session) = entry.session {
            if tokens_equal(&session.consumed_token, &presented) {
                return Err(AuthError::ChallengeAlreadyConsumed);
            }
        }

        let challenge = entry.pending.ok_or(AuthError::ChallengeMismatch)?;
        if now - challenge.issued_at > self.challenge_ttl {
            entry.pending = None;
            if entry.is_empty() {
                drop(entry);
                self.states.remove_if(address, |_, state| state.is_empty());
            }
            return Err(AuthError::ChallengeExpired);
        }
        if !tokens_equal(&challenge.token, &presented) {
            return Err(AuthError::ChallengeMismatch);
        }

        entry.pending = None;
        entry.session = Some(Session {
            consumed_token: challenge.token,
            last_activity: now,
        });
        Ok(())
    }

    /// True iff `address` is authenticated and not idle past the timeout.
    pub fn validate_session(&self, address: &Address) -> bool {
        let now = self.clock.now();
        self.states
            .get(address)
            .and_then(|state| state.session)
            .is_some_and(|session| now - session.last_activity <= self.session_timeout)
    }

    /// Refresh the activity timestamp; no-op unless authenticated.
    pub fn update_session(&self, address: &Address) {
        let now = self.clock.now();
        if let Some(mut entry) = self.states.get_mut(address) {
            if let Some(session) = entry.session.as_mut() {
                session.last_activity = now;
            }
        }
    }

    /// Drop expired challenges and idle sessions. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.states.retain(|_, state| {
            if state
                .pending
                .is_some_and(|c| now - c.issued_at > self.challenge_ttl)
            {
                state.pending = None;
                removed += 1;
            }
            if state
                .session
                .is_some_and(|s| now - s.last_activity > self.session_timeout)
            {
                state.session = None;
                removed += 1;
            }
            !state.is_empty()
        });
        removed
    }

    /// Number of addresses holding a pending challenge or a session.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

fn tokens_equal(a: &Uuid, b: &Uuid) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

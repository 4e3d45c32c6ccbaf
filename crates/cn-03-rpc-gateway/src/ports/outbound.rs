//! Outbound ports for the gateway.
//!
//! Persistence and time are reached only through these traits so that the
//! dispatcher can run against in-memory adapters and a manual clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{Address, AppSession, Channel, ChannelStatus, RpcData, StorageError};

/// Time source trait for testability
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Unix epoch milliseconds, zero before the epoch.
    fn now_millis(&self) -> u64 {
        u64::try_from(self.now().timestamp_millis()).unwrap_or(0)
    }
}

/// System time implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Application session records.
pub trait AppSessionStore: Send + Sync {
    /// Insert a new session; `Conflict` if the id exists.
    fn insert(&self, session: AppSession) -> Result<(), StorageError>;

    fn get(&self, session_id: &str) -> Result<Option<AppSession>, StorageError>;

    /// Replace an existing session; `NotFound` if absent.
    fn update(&self, session: AppSession) -> Result<(), StorageError>;

    /// Sessions that list `participant`, optionally filtered by status.
    ///
    /// Membership is an exact address match over the participant list.
    fn sessions_for_participant(
        &self,
        participant: &Address,
        status: Option<ChannelStatus>,
    ) -> Result<Vec<AppSession>, StorageError>;
}

/// Payment channel snapshots.
pub trait ChannelStore: Send + Sync {
    fn upsert(&self, channel: Channel) -> Result<(), StorageError>;

    fn get(&self, channel_id: &str) -> Result<Option<Channel>, StorageError>;

    fn channels_for_participant(
        &self,
        participant: &Address,
        status: Option<ChannelStatus>,
    ) -> Result<Vec<Channel>, StorageError>;
}

/// One recorded mutating exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRecord {
    pub id: u64,
    pub sender: Address,
    pub req_id: u64,
    pub method: String,
    pub params: Vec<serde_json::Value>,
    pub timestamp: u64,
    pub req_sig: Vec<String>,
    /// Canonical bytes of the signed response half.
    pub response: String,
    pub res_sig: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only history of served mutating requests and rejected requests,
/// each with the node's signed answer.
pub trait RpcHistoryStore: Send + Sync {
    fn store_message(
        &self,
        sender: &Address,
        request: &RpcData,
        request_sigs: &[String],
        response_bytes: &[u8],
        response_sigs: &[String],
    ) -> Result<(), StorageError>;

    /// Records of `sender`, newest first.
    fn history(&self, sender: &Address) -> Result<Vec<RpcRecord>, StorageError>;
}

//! In-memory store adapters.

use crate::ports::{AppSessionStore, ChannelStore, RpcHistoryStore, RpcRecord};
use chrono::Utc;
use parking_lot::RwLock;
use shared_types::{Address, AppSession, Channel, ChannelStatus, RpcData, StorageError};
use std::collections::HashMap;

// =============================================================================
// App sessions
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryAppSessionStore {
    sessions: RwLock<HashMap<String, AppSession>>,
}

impl InMemoryAppSessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AppSessionStore for InMemoryAppSessionStore {
    fn insert(&self, session: AppSession) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.session_id) {
            return Err(StorageError::Conflict(format!(
                "app session {}",
                session.session_id
            )));
        }
        sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    fn get(&self, session_id: &str) -> Result<Option<AppSession>, StorageError> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    fn update(&self, session: AppSession) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(&session.session_id) {
            Some(existing) => {
                *existing = session;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!(
                "app session {}",
                session.session_id
            ))),
        }
    }

    fn sessions_for_participant(
        &self,
        participant: &Address,
        status: Option<ChannelStatus>,
    ) -> Result<Vec<AppSession>, StorageError> {
        let sessions = self.sessions.read();
        let mut found: Vec<AppSession> = sessions
            .values()
            .filter(|s| s.is_participant(participant))
            .filter(|s| status.map_or(true, |st| s.status == st))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

// =============================================================================
// Channels
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryChannelStore {
    channels: RwLock<HashMap<String, Channel>>,
}

impl InMemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChannelStore for InMemoryChannelStore {
    fn upsert(&self, channel: Channel) -> Result<(), StorageError> {
        self.channels
            .write()
            .insert(channel.channel_id.clone(), channel);
        Ok(())
    }

    fn get(&self, channel_id: &str) -> Result<Option<Channel>, StorageError> {
        Ok(self.channels.read().get(channel_id).cloned())
    }

    fn channels_for_participant(
        &self,
        participant: &Address,
        status: Option<ChannelStatus>,
    ) -> Result<Vec<Channel>, StorageError> {
        let channels = self.channels.read();
        let mut found: Vec<Channel> = channels
            .values()
            .filter(|c| c.participant == *participant)
            .filter(|c| status.map_or(true, |st| c.status == st))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

// =============================================================================
// RPC history
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryRpcHistoryStore {
    records: RwLock<Vec<RpcRecord>>,
}

impl InMemoryRpcHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RpcHistoryStore for InMemoryRpcHistoryStore {
    fn store_message(
        &self,
        sender: &Address,
        request: &RpcData,
        request_sigs: &[String],
        response_bytes: &[u8],
        response_sigs: &[String],
    ) -> Result<(), StorageError> {
        let response = String::from_utf8(response_bytes.to_vec())
            .map_err(|e| StorageError::Backend(format!("response is not UTF-8: {e}")))?;

        let mut records = self.records.write();
        let id = records.len() as u64 + 1;
        records.push(RpcRecord {
            id,
            sender: *sender,
            req_id: request.request_id,
            method: request.method.clone(),
            params: request.params.clone(),
            timestamp: request.timestamp,
            req_sig: request_sigs.to_vec(),
            response,
            res_sig: response_sigs.to_vec(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn history(&self, sender: &Address) -> Result<Vec<RpcRecord>, StorageError> {
        let records = self.records.read();
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.sender == *sender)
            .cloned()
            .collect())
    }
}

//! RPC method handlers.
//!
//! Handlers are synchronous: every store they touch is in-process and none of
//! them awaits. The dispatcher owns signing, pushes and history; a handler only
//! turns a request into result params.

pub mod app_session;
pub mod channel;
pub mod query;

use crate::domain::config::ClearnodeConfig;
use crate::domain::error::RpcError;
use crate::domain::methods::RpcMethod;
use crate::forwarder::signers_of;
use crate::ports::{AppSessionStore, ChannelStore, Clock, RpcHistoryStore};
use crate::responder::Responder;
use cn_02_ledger::Ledger;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared_types::{Address, Channel, RpcData};
use std::collections::HashSet;
use std::sync::Arc;

/// One authenticated request as seen by a handler.
#[derive(Debug, Clone, Copy)]
pub struct Call<'a> {
    /// Address the connection authenticated as.
    pub caller: Address,
    pub request: &'a RpcData,
    pub signatures: &'a [String],
}

impl Call<'_> {
    /// Addresses that signed the request half.
    pub fn signers(&self) -> Result<HashSet<Address>, RpcError> {
        signers_of(self.request, self.signatures)
    }

    /// Decode `params[0]`; missing is an error.
    pub fn param<T: DeserializeOwned>(&self) -> Result<T, RpcError> {
        let first = self
            .request
            .params
            .first()
            .ok_or_else(|| RpcError::invalid_params("missing parameters"))?;
        Ok(T::deserialize(first)?)
    }

    /// Decode `params[0]`, falling back to `T::default()` when absent or null.
    pub fn optional_param<T: DeserializeOwned + Default>(&self) -> Result<T, RpcError> {
        match self.request.params.first() {
            None | Some(Value::Null) => Ok(T::default()),
            Some(first) => Ok(T::deserialize(first)?),
        }
    }
}

/// What a handler produced.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Params of the response half.
    pub params: Vec<Value>,
    /// Channel whose state changed, pushed to its owner as `cu`.
    pub channel_update: Option<Channel>,
}

impl Outcome {
    pub fn single(result: Value) -> Self {
        Self {
            params: vec![result],
            channel_update: None,
        }
    }
}

/// Handler table over the node's stores.
pub struct RpcHandlers {
    pub(crate) config: Arc<ClearnodeConfig>,
    pub(crate) responder: Responder,
    pub(crate) ledger: Ledger,
    pub(crate) sessions: Arc<dyn AppSessionStore>,
    pub(crate) channels: Arc<dyn ChannelStore>,
    pub(crate) history: Arc<dyn RpcHistoryStore>,
    pub(crate) clock: Arc<dyn Clock>,
    /// Serializes mutating operations so a balance check and the ledger moves
    /// that depend on it are never interleaved with another mutation.
    pub(crate) mutations: Mutex<()>,
}

impl RpcHandlers {
    pub fn new(
        config: Arc<ClearnodeConfig>,
        responder: Responder,
        ledger: Ledger,
        sessions: Arc<dyn AppSessionStore>,
        channels: Arc<dyn ChannelStore>,
        history: Arc<dyn RpcHistoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            responder,
            ledger,
            sessions,
            channels,
            history,
            clock,
            mutations: Mutex::new(()),
        }
    }

    pub fn handle(&self, method: RpcMethod, call: &Call<'_>) -> Result<Outcome, RpcError> {
        match method {
            RpcMethod::Ping => Ok(Outcome::default()),
            RpcMethod::GetConfig => self.get_config(),
            RpcMethod::GetAssets => self.get_assets(call),
            RpcMethod::GetLedgerBalances => self.get_ledger_balances(call),
            RpcMethod::GetLedgerEntries => self.get_ledger_entries(call),
            RpcMethod::GetAppDefinition => self.get_app_definition(call),
            RpcMethod::GetAppSessions => self.get_app_sessions(call),
            RpcMethod::GetChannels => self.get_channels(call),
            RpcMethod::GetRpcHistory => self.get_rpc_history(call),
            RpcMethod::CreateAppSession => self.create_app_session(call),
            RpcMethod::CloseAppSession => self.close_app_session(call),
            RpcMethod::ResizeChannel => self.resize_channel(call),
            RpcMethod::CloseChannel => self.close_channel(call),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn channels(&self) -> &Arc<dyn ChannelStore> {
        &self.channels
    }

    pub fn history(&self) -> &Arc<dyn RpcHistoryStore> {
        &self.history
    }
}

/// Ledger account identifier for user input: addresses in checksum form,
/// anything else lowercased.
pub fn normalize_account_id(account_id: &str) -> String {
    let trimmed = account_id.trim();
    match trimmed.parse::<Address>() {
        Ok(address) => address.to_string(),
        Err(_) => trimmed.to_lowercase(),
    }
}

/// Wallet account of a participant.
pub fn wallet_account(participant: &Address) -> String {
    participant.to_string()
}

//! Read-only methods.

use super::{normalize_account_id, wallet_account, Call, Outcome, RpcHandlers};
use crate::domain::error::RpcError;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::{Address, AppSession, ChannelStatus};
use tracing::instrument;

#[derive(Debug, Default, Deserialize)]
struct AssetFilter {
    #[serde(default)]
    chain_id: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AccountQuery {
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    asset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    app_session_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ParticipantQuery {
    #[serde(default)]
    participant: Option<Address>,
    #[serde(default)]
    status: Option<ChannelStatus>,
}

impl RpcHandlers {
    pub(super) fn get_config(&self) -> Result<Outcome, RpcError> {
        Ok(Outcome::single(json!({
            "broker_address": self.responder.address(),
            "networks": self.config.networks,
        })))
    }

    pub(super) fn get_assets(&self, call: &Call<'_>) -> Result<Outcome, RpcError> {
        let filter: AssetFilter = call.optional_param()?;
        let assets: Vec<_> = self
            .config
            .assets
            .iter()
            .filter(|a| filter.chain_id.map_or(true, |id| a.chain_id == id))
            .collect();
        Ok(Outcome::single(json!(assets)))
    }

    #[instrument(skip_all, fields(caller = %call.caller))]
    pub(super) fn get_ledger_balances(&self, call: &Call<'_>) -> Result<Outcome, RpcError> {
        let query: AccountQuery = call.optional_param()?;
        let account_id = self.account_or_wallet(call, query.account_id.as_deref());
        let balances = self.ledger.participant(call.caller).balances(&account_id)?;
        Ok(Outcome::single(json!(balances)))
    }

    #[instrument(skip_all, fields(caller = %call.caller))]
    pub(super) fn get_ledger_entries(&self, call: &Call<'_>) -> Result<Outcome, RpcError> {
        let query: AccountQuery = call.optional_param()?;
        let account_id = self.account_or_wallet(call, query.account_id.as_deref());
        let entries = self
            .ledger
            .participant(call.caller)
            .entries(&account_id, query.asset.as_deref())?;
        Ok(Outcome::single(json!(entries)))
    }

    pub(super) fn get_app_definition(&self, call: &Call<'_>) -> Result<Outcome, RpcError> {
        let query: SessionQuery = call.param()?;
        let session = self
            .sessions
            .get(&query.app_session_id)?
            .ok_or_else(|| RpcError::NotFound(format!("app session {}", query.app_session_id)))?;
        Ok(Outcome::single(json!({
            "protocol": session.protocol,
            "participants": session.participants,
            "weights": session.weights,
            "quorum": session.quorum,
            "challenge": session.challenge,
            "nonce": session.nonce,
        })))
    }

    pub(super) fn get_app_sessions(&self, call: &Call<'_>) -> Result<Outcome, RpcError> {
        let query: ParticipantQuery = call.optional_param()?;
        let participant = query.participant.unwrap_or(call.caller);
        let sessions: Vec<Value> = self
            .sessions
            .sessions_for_participant(&participant, query.status)?
            .iter()
            .map(session_view)
            .collect();
        Ok(Outcome::single(json!(sessions)))
    }

    pub(super) fn get_channels(&self, call: &Call<'_>) -> Result<Outcome, RpcError> {
        let query: ParticipantQuery = call.optional_param()?;
        let participant = query.participant.unwrap_or(call.caller);
        let channels = self
            .channels
            .channels_for_participant(&participant, query.status)?;
        Ok(Outcome::single(json!(channels)))
    }

    pub(super) fn get_rpc_history(&self, call: &Call<'_>) -> Result<Outcome, RpcError> {
        let records = self.history.history(&call.caller)?;
        Ok(Outcome::single(json!(records)))
    }

    fn account_or_wallet(&self, call: &Call<'_>, account_id: Option<&str>) -> String {
        match account_id {
            Some(id) if !id.trim().is_empty() => normalize_account_id(id),
            _ => wallet_account(&call.caller),
        }
    }
}

/// Wire form of a session record.
pub(crate) fn session_view(session: &AppSession) -> Value {
    json!({
        "app_session_id": session.session_id,
        "status": session.status,
        "participants": session.participants,
        "protocol": session.protocol,
        "challenge": session.challenge,
        "weights": session.weights,
        "quorum": session.quorum,
        "version": session.version,
        "nonce": session.nonce,
        "created_at": session.created_at,
        "updated_at": session.updated_at,
    })
}

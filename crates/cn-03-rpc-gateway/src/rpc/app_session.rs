//! Application session lifecycle: `create_app_session`, `close_app_session`.
//!
//! Funds move between two ledger accounts of the same participant: the
//! participant's wallet account and the session account. A session's holdings
//! are therefore the sum over participants of their session-account balances.

use super::{wallet_account, Call, Outcome, RpcHandlers};
use crate::domain::error::RpcError;
use cn_01_signature_verification::keccak256;
use cn_02_ledger::{exact_add, exact_sub, ArithmeticError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_types::{Address, AppSession, ChannelStatus, DEFAULT_PROTOCOL};
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// Immutable parameters that identify a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDefinition {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub participants: Vec<Address>,
    pub weights: Vec<u64>,
    pub quorum: u64,
    #[serde(default)]
    pub challenge: u64,
    pub nonce: u64,
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

impl AppDefinition {
    /// `0x` + keccak256 of the canonical definition JSON.
    pub fn session_id(&self) -> Result<String, RpcError> {
        let bytes = serde_json::to_vec(self).map_err(|e| RpcError::Protocol(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(keccak256(&bytes))))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppAllocation {
    pub participant: Address,
    pub asset: String,
    #[serde(deserialize_with = "cn_02_ledger::amount::deserialize")]
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct CreateAppSession {
    definition: AppDefinition,
    #[serde(default)]
    allocations: Vec<AppAllocation>,
}

#[derive(Debug, Deserialize)]
struct CloseAppSession {
    app_session_id: String,
    #[serde(default)]
    allocations: Vec<AppAllocation>,
}

type Allocations = BTreeMap<(Address, String), Decimal>;

impl RpcHandlers {
    #[instrument(skip_all, fields(caller = %call.caller))]
    pub(super) fn create_app_session(&self, call: &Call<'_>) -> Result<Outcome, RpcError> {
        let params: CreateAppSession = call.param()?;
        let def = params.definition;
        AppSession::validate_definition(&def.participants, &def.weights, def.quorum)?;
        if def.nonce == 0 {
            return Err(RpcError::invalid_params("nonce must be non-zero"));
        }
        let session_id = def.session_id()?;

        let allocations = aggregate(&params.allocations, |p| def.participants.contains(p))?;
        let signers = call.signers()?;
        for ((participant, _), amount) in &allocations {
            if !amount.is_zero() && !signers.contains(participant) {
                return Err(RpcError::Authorization(format!(
                    "missing signature of {participant} for its allocation"
                )));
            }
        }

        let _guard = self.mutations.lock();
        if self.sessions.get(&session_id)?.is_some() {
            return Err(RpcError::invalid_params(format!(
                "app session {session_id} already exists"
            )));
        }

        for ((participant, asset), amount) in &allocations {
            let available = self
                .ledger
                .participant(*participant)
                .balance(&wallet_account(participant), asset)?;
            if available < *amount {
                return Err(RpcError::invalid_params(format!(
                    "insufficient funds: {participant} has {available} {asset}, needs {amount}"
                )));
            }
            exact_sub(available, *amount).map_err(|e| amount_error(e, asset))?;
        }

        for ((participant, asset), amount) in &allocations {
            let ledger = self.ledger.participant(*participant);
            ledger.record(&wallet_account(participant), asset, -*amount)?;
            ledger.record(&session_id, asset, *amount)?;
        }

        let mut session = AppSession::new(
            session_id.clone(),
            def.protocol,
            def.participants,
            def.weights,
            def.quorum,
            def.challenge,
            def.nonce,
        )?;
        let now = self.clock.now();
        session.created_at = now;
        session.updated_at = now;
        let version = session.version;
        self.sessions.insert(session)?;

        info!(session_id = %session_id, allocations = allocations.len(), "App session created");
        Ok(Outcome::single(json!({
            "app_session_id": session_id,
            "version": version,
            "status": ChannelStatus::Open,
        })))
    }

    #[instrument(skip_all, fields(caller = %call.caller))]
    pub(super) fn close_app_session(&self, call: &Call<'_>) -> Result<Outcome, RpcError> {
        let params: CloseAppSession = call.param()?;
        let signers = call.signers()?;

        let _guard = self.mutations.lock();
        let mut session = self
            .sessions
            .get(&params.app_session_id)?
            .ok_or_else(|| RpcError::NotFound(format!("app session {}", params.app_session_id)))?;
        if session.status != ChannelStatus::Open {
            return Err(RpcError::invalid_params(format!(
                "app session {} is {}",
                session.session_id, session.status
            )));
        }

        let weight = session.signed_weight(signers.iter());
        if weight < session.quorum {
            return Err(RpcError::Authorization(format!(
                "signed weight {weight} below quorum {}",
                session.quorum
            )));
        }

        let allocations = aggregate(&params.allocations, |p| session.is_participant(p))?;

        let mut holdings = Vec::new();
        let mut held: BTreeMap<String, Decimal> = BTreeMap::new();
        for participant in &session.participants {
            for balance in self
                .ledger
                .participant(*participant)
                .balances(&session.session_id)?
            {
                if balance.amount.is_zero() {
                    continue;
                }
                add_to(&mut held, &balance.asset, balance.amount)?;
                holdings.push((*participant, balance));
            }
        }

        let mut allocated: BTreeMap<String, Decimal> = BTreeMap::new();
        for ((_, asset), amount) in allocations.iter().filter(|(_, a)| !a.is_zero()) {
            add_to(&mut allocated, asset, *amount)?;
        }
        if allocated != held {
            return Err(RpcError::invalid_params(
                "allocations do not match the session's holdings",
            ));
        }
        for ((participant, asset), amount) in &allocations {
            let wallet = self
                .ledger
                .participant(*participant)
                .balance(&wallet_account(participant), asset)?;
            exact_add(wallet, *amount).map_err(|e| amount_error(e, asset))?;
        }

        for (participant, balance) in &holdings {
            self.ledger.participant(*participant).record(
                &session.session_id,
                &balance.asset,
                -balance.amount,
            )?;
        }
        for ((participant, asset), amount) in &allocations {
            self.ledger
                .participant(*participant)
                .record(&wallet_account(participant), asset, *amount)?;
        }

        session.status = ChannelStatus::Closed;
        session.version += 1;
        session.updated_at = self.clock.now();
        let (session_id, version) = (session.session_id.clone(), session.version);
        self.sessions.update(session)?;

        info!(session_id = %session_id, weight, "App session closed");
        Ok(Outcome::single(json!({
            "app_session_id": session_id,
            "version": version,
            "status": ChannelStatus::Closed,
        })))
    }
}

/// Sum allocations per (participant, asset), rejecting negative amounts,
/// empty assets and non-participants.
fn aggregate(
    allocations: &[AppAllocation],
    is_participant: impl Fn(&Address) -> bool,
) -> Result<Allocations, RpcError> {
    let mut out = Allocations::new();
    for alloc in allocations {
        if alloc.amount.is_sign_negative() && !alloc.amount.is_zero() {
            return Err(RpcError::invalid_params(format!(
                "negative allocation for {}",
                alloc.participant
            )));
        }
        let asset = alloc.asset.trim().to_lowercase();
        if asset.is_empty() {
            return Err(RpcError::invalid_params("allocation asset is empty"));
        }
        if !is_participant(&alloc.participant) {
            return Err(RpcError::invalid_params(format!(
                "{} is not a session participant",
                alloc.participant
            )));
        }
        let slot = out.entry((alloc.participant, asset)).or_insert(Decimal::ZERO);
        *slot = exact_add(*slot, alloc.amount).map_err(|e| amount_error(e, &alloc.asset))?;
    }
    Ok(out)
}

fn add_to(
    totals: &mut BTreeMap<String, Decimal>,
    asset: &str,
    amount: Decimal,
) -> Result<(), RpcError> {
    let slot = totals.entry(asset.to_string()).or_insert(Decimal::ZERO);
    *slot = exact_add(*slot, amount).map_err(|e| amount_error(e, asset))?;
    Ok(())
}

fn amount_error(e: ArithmeticError, asset: &str) -> RpcError {
    RpcError::invalid_params(format!("{asset} amount: {e}"))
}

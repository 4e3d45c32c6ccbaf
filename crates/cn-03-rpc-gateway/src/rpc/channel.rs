//! Channel state updates: `resize_channel`, `close_channel`.
//!
//! The node computes the caller's new allocation from its unified (wallet)
//! balance and returns a state signed with the node key. Submitting that
//! state on chain is the client's business.

use super::{wallet_account, Call, Outcome, RpcHandlers};
use crate::domain::error::RpcError;
use cn_01_signature_verification::keccak256;
use cn_02_ledger::exact_add;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::{Address, Asset, Channel, ChannelStatus};
use tracing::{info, instrument};

pub const INTENT_RESIZE: &str = "resize";
pub const INTENT_FINALIZE: &str = "finalize";

#[derive(Debug, Deserialize)]
struct ResizeChannel {
    channel_id: String,
    #[serde(default, deserialize_with = "cn_02_ledger::amount::deserialize")]
    participant_change: Decimal,
    funds_destination: Address,
}

#[derive(Debug, Deserialize)]
struct CloseChannel {
    channel_id: String,
    funds_destination: Address,
}

/// One allocation of a channel state. Fields are in lexical order so that the
/// struct and a generic JSON object serialize to the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateAllocation {
    /// Raw token units, decimal string.
    pub amount: String,
    pub destination: Address,
    pub token: Address,
}

/// The state the node signs. Field order is lexical, as above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelState {
    pub allocations: Vec<StateAllocation>,
    pub channel_id: String,
    pub intent: String,
    pub version: u64,
}

impl RpcHandlers {
    #[instrument(skip_all, fields(caller = %call.caller))]
    pub(super) fn resize_channel(&self, call: &Call<'_>) -> Result<Outcome, RpcError> {
        let params: ResizeChannel = call.param()?;

        let _guard = self.mutations.lock();
        let (channel, asset) = self.owned_open_channel(call, &params.channel_id)?;
        let balance = self.unified_balance(call, &asset)?;
        let target = exact_add(balance, params.participant_change)
            .map_err(|e| RpcError::invalid_params(format!("resize amount: {e}")))?;
        if target.is_sign_negative() && !target.is_zero() {
            return Err(RpcError::invalid_params(format!(
                "insufficient unified balance: {balance} {}",
                asset.symbol
            )));
        }

        let amount = to_raw_units(target, asset.decimals)?;
        self.advance_channel(channel, INTENT_RESIZE, params.funds_destination, amount)
    }

    #[instrument(skip_all, fields(caller = %call.caller))]
    pub(super) fn close_channel(&self, call: &Call<'_>) -> Result<Outcome, RpcError> {
        let params: CloseChannel = call.param()?;

        let _guard = self.mutations.lock();
        let (channel, asset) = self.owned_open_channel(call, &params.channel_id)?;
        let balance = self.unified_balance(call, &asset)?;
        if balance.is_sign_negative() && !balance.is_zero() {
            return Err(RpcError::invalid_params(format!(
                "negative unified balance: {balance} {}",
                asset.symbol
            )));
        }

        let amount = to_raw_units(balance, asset.decimals)?;
        self.advance_channel(channel, INTENT_FINALIZE, params.funds_destination, amount)
    }

    fn owned_open_channel(
        &self,
        call: &Call<'_>,
        channel_id: &str,
    ) -> Result<(Channel, Asset), RpcError> {
        let channel = self
            .channels
            .get(channel_id)?
            .ok_or_else(|| RpcError::NotFound(format!("channel {channel_id}")))?;
        if channel.participant != call.caller {
            return Err(RpcError::Authorization(format!(
                "channel {channel_id} does not belong to {}",
                call.caller
            )));
        }
        if channel.status != ChannelStatus::Open {
            return Err(RpcError::invalid_params(format!(
                "channel {channel_id} is {}",
                channel.status
            )));
        }
        let asset = self
            .config
            .asset_for(&channel.token, channel.chain_id)
            .cloned()
            .ok_or_else(|| {
                RpcError::invalid_params(format!(
                    "no asset configured for token {} on chain {}",
                    channel.token, channel.chain_id
                ))
            })?;
        Ok((channel, asset))
    }

    fn unified_balance(&self, call: &Call<'_>, asset: &Asset) -> Result<Decimal, RpcError> {
        Ok(self
            .ledger
            .participant(call.caller)
            .balance(&wallet_account(&call.caller), &asset.symbol)?)
    }

    /// Sign the next state of `channel` and store the bumped channel.
    fn advance_channel(
        &self,
        mut channel: Channel,
        intent: &str,
        destination: Address,
        amount: u128,
    ) -> Result<Outcome, RpcError> {
        let version = channel.version + 1;
        let state = ChannelState {
            allocations: vec![
                StateAllocation {
                    amount: amount.to_string(),
                    destination,
                    token: channel.token,
                },
                StateAllocation {
                    amount: "0".into(),
                    destination: self.responder.address(),
                    token: channel.token,
                },
            ],
            channel_id: channel.channel_id.clone(),
            intent: intent.to_string(),
            version,
        };
        let signed = self.sign_state(&state)?;

        channel.version = version;
        channel.amount = amount;
        channel.updated_at = self.clock.now();
        self.channels.upsert(channel.clone())?;

        info!(
            channel_id = %channel.channel_id,
            intent,
            version,
            amount = %amount,
            "Channel state signed"
        );
        Ok(Outcome {
            params: vec![signed],
            channel_update: Some(channel),
        })
    }

    fn sign_state(&self, state: &ChannelState) -> Result<Value, RpcError> {
        let bytes = serde_json::to_vec(state).map_err(|e| RpcError::Signing(e.to_string()))?;
        let server_signature = self.responder.sign_bytes(&bytes)?;
        Ok(json!({
            "channel_id": state.channel_id,
            "intent": state.intent,
            "version": state.version,
            "allocations": state.allocations,
            "state_hash": format!("0x{}", hex::encode(keccak256(&bytes))),
            "server_signature": server_signature,
        }))
    }
}

/// Scale a decimal token amount to raw units (`amount × 10^decimals`).
///
/// Fails for negative amounts, for amounts finer than the token's precision
/// and for results that do not fit in `u128`.
pub fn to_raw_units(amount: Decimal, decimals: u32) -> Result<u128, RpcError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(RpcError::invalid_params(format!("negative amount {amount}")));
    }
    // Integer arithmetic on the mantissa, so no digit is ever rounded away.
    let normalized = amount.normalize();
    let Some(shift) = decimals.checked_sub(normalized.scale()) else {
        return Err(RpcError::invalid_params(format!(
            "amount {amount} exceeds {decimals} decimals"
        )));
    };
    let mantissa = normalized.mantissa().unsigned_abs();
    10u128
        .checked_pow(shift)
        .and_then(|factor| mantissa.checked_mul(factor))
        .ok_or_else(|| RpcError::invalid_params(format!("amount {amount} out of range")))
}

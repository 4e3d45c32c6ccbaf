//! Method registry.
//!
//! Handshake methods are only valid before authentication; dispatch methods
//! only after. Unknown names never reach a handler.

use std::fmt;
use std::str::FromStr;

pub const AUTH_REQUEST: &str = "auth_request";
pub const AUTH_CHALLENGE: &str = "auth_challenge";
pub const AUTH_VERIFY: &str = "auth_verify";
pub const ERROR: &str = "error";

/// Server push: balances snapshot.
pub const PUSH_BALANCES: &str = "bu";
/// Server push: open channels snapshot.
pub const PUSH_CHANNELS: &str = "channels";
/// Server push: single channel update.
pub const PUSH_CHANNEL: &str = "cu";

/// Methods served to authenticated participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    Ping,
    GetConfig,
    GetAssets,
    GetLedgerBalances,
    GetLedgerEntries,
    GetAppDefinition,
    CreateAppSession,
    CloseAppSession,
    GetAppSessions,
    ResizeChannel,
    CloseChannel,
    GetChannels,
    GetRpcHistory,
}

impl RpcMethod {
    pub const COUNT: usize = 13;

    pub const ALL: [RpcMethod; Self::COUNT] = [
        RpcMethod::Ping,
        RpcMethod::GetConfig,
        RpcMethod::GetAssets,
        RpcMethod::GetLedgerBalances,
        RpcMethod::GetLedgerEntries,
        RpcMethod::GetAppDefinition,
        RpcMethod::CreateAppSession,
        RpcMethod::CloseAppSession,
        RpcMethod::GetAppSessions,
        RpcMethod::ResizeChannel,
        RpcMethod::CloseChannel,
        RpcMethod::GetChannels,
        RpcMethod::GetRpcHistory,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            RpcMethod::Ping => "ping",
            RpcMethod::GetConfig => "get_config",
            RpcMethod::GetAssets => "get_assets",
            RpcMethod::GetLedgerBalances => "get_ledger_balances",
            RpcMethod::GetLedgerEntries => "get_ledger_entries",
            RpcMethod::GetAppDefinition => "get_app_definition",
            RpcMethod::CreateAppSession => "create_app_session",
            RpcMethod::CloseAppSession => "close_app_session",
            RpcMethod::GetAppSessions => "get_app_sessions",
            RpcMethod::ResizeChannel => "resize_channel",
            RpcMethod::CloseChannel => "close_channel",
            RpcMethod::GetChannels => "get_channels",
            RpcMethod::GetRpcHistory => "get_rpc_history",
        }
    }

    /// Method name carried by the response half.
    pub const fn response_name(&self) -> &'static str {
        match self {
            RpcMethod::Ping => "pong",
            other => other.as_str(),
        }
    }

    /// Mutating methods push a balance update and are written to RPC history.
    pub const fn is_mutating(&self) -> bool {
        matches!(
            self,
            RpcMethod::CreateAppSession
                | RpcMethod::CloseAppSession
                | RpcMethod::ResizeChannel
                | RpcMethod::CloseChannel
        )
    }

    /// Index into per-method counters.
    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl FromStr for RpcMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RpcMethod::ALL
            .iter()
            .find(|m| m.as_str() == s)
            .copied()
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

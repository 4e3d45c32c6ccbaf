//! Clearnode configuration with validation.
//!
//! Sources, later wins: built-in defaults, an optional JSON file, environment
//! overrides (`CLEARNODE_*`).

use serde::{Deserialize, Serialize};
use shared_types::{Address, Asset};
use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

pub const ENV_HOST: &str = "CLEARNODE_HOST";
pub const ENV_PORT: &str = "CLEARNODE_PORT";
pub const ENV_PRIVATE_KEY: &str = "CLEARNODE_PRIVATE_KEY";
pub const ENV_MSG_EXPIRY_SECS: &str = "CLEARNODE_MSG_EXPIRY_SECS";
pub const ENV_LOG_LEVEL: &str = "CLEARNODE_LOG_LEVEL";

/// Main node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClearnodeConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub protocol: ProtocolConfig,
    pub signer: SignerConfig,
    /// Chains the node has custody contracts on, returned by `get_config`.
    pub networks: Vec<NetworkConfig>,
    /// Supported tokens, returned by `get_assets`.
    pub assets: Vec<Asset>,
    /// `tracing` filter directive.
    pub log_level: LogLevel,
}

impl ClearnodeConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `CLEARNODE_*` overrides obtained through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.server.host = host
                .parse()
                .map_err(|_| ConfigError::InvalidEnv(ENV_HOST, host))?;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv(ENV_PORT, port))?;
        }
        if let Some(key) = lookup(ENV_PRIVATE_KEY) {
            self.signer.private_key = Some(key);
        }
        if let Some(secs) = lookup(ENV_MSG_EXPIRY_SECS) {
            let parsed: u64 = secs
                .parse()
                .map_err(|_| ConfigError::InvalidEnv(ENV_MSG_EXPIRY_SECS, secs))?;
            self.protocol.msg_expiry = Duration::from_secs(parsed);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = LogLevel(level);
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port cannot be 0".into()));
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid(
                "server.ws_path must start with '/'".into(),
            ));
        }
        if self.server.outbound_queue == 0 {
            return Err(ConfigError::Invalid(
                "server.outbound_queue cannot be 0".into(),
            ));
        }

        let durations = [
            ("auth.challenge_ttl", self.auth.challenge_ttl),
            ("auth.session_timeout", self.auth.session_timeout),
            ("auth.cleanup_interval", self.auth.cleanup_interval),
            ("protocol.msg_expiry", self.protocol.msg_expiry),
            ("protocol.write_timeout", self.protocol.write_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::InvalidTimeout(format!("{name} cannot be 0")));
            }
        }

        if self.protocol.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "protocol.max_message_size cannot be 0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for asset in &self.assets {
            if asset.symbol.trim().is_empty() {
                return Err(ConfigError::InvalidAsset(format!(
                    "empty symbol for token {} on chain {}",
                    asset.token, asset.chain_id
                )));
            }
            if !seen.insert((asset.token, asset.chain_id)) {
                return Err(ConfigError::InvalidAsset(format!(
                    "duplicate token {} on chain {}",
                    asset.token, asset.chain_id
                )));
            }
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }

    /// Asset for a channel token.
    pub fn asset_for(&self, token: &Address, chain_id: u32) -> Option<&Asset> {
        self.assets
            .iter()
            .find(|a| a.token == *token && a.chain_id == chain_id)
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Path the WebSocket upgrade is served on.
    pub ws_path: String,
    /// Per-connection outbound frame queue depth.
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8000,
            ws_path: "/ws".to_string(),
            outbound_queue: 256,
        }
    }
}

/// Authentication timings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of an unconsumed challenge.
    #[serde(with = "humantime_serde")]
    pub challenge_ttl: Duration,
    /// Idle window of an authenticated session.
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,
    /// How often expired auth state is purged.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            challenge_ttl: Duration::from_secs(5 * 60),
            session_timeout: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Wire protocol limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Maximum age of a request timestamp.
    #[serde(with = "humantime_serde")]
    pub msg_expiry: Duration,
    /// Deadline for handing one frame to a socket.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
    /// Maximum inbound frame size in bytes.
    pub max_message_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            msg_expiry: Duration::from_secs(60),
            write_timeout: Duration::from_secs(5),
            max_message_size: 1024 * 1024, // 1MB
        }
    }
}

/// Node signing key
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Hex private key. Never serialized back out.
    #[serde(skip_serializing)]
    pub private_key: Option<String>,
}

impl fmt::Debug for SignerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerConfig")
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A chain the node settles on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u32,
    pub custody_address: Address,
    pub adjudicator_address: Address,
}

/// `tracing` filter directive, `info` by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogLevel(pub String);

impl Default for LogLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("invalid value for {0}: {1:?}")]
    InvalidEnv(&'static str, String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("invalid asset: {0}")]
    InvalidAsset(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

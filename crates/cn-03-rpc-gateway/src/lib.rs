//! # RPC Gateway (CN-03)
//!
//! The clearnode's only network surface: a WebSocket endpoint speaking the
//! signed `req`/`res` envelope protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                         RPC GATEWAY (cn-03)                        │
//! ├────────────────────────────────────────────────────────────────────┤
//! │  ws (axum upgrade) ──frames──→ Dispatcher                          │
//! │                                  │  handshake: AuthManager         │
//! │                                  │  relay:     Forwarder ──┐       │
//! │                                  │  methods:   RpcHandlers │       │
//! │                                  ↓                         ↓       │
//! │                             Responder (signs)     ConnectionRegistry│
//! │                                                                    │
//! │  ports: AppSessionStore, ChannelStore, RpcHistoryStore, Clock      │
//! │  ledger: cn-02 (exact decimal, double entry)                       │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use cn_03_rpc_gateway::{ClearnodeConfig, ClearnodeService, Stores};
//!
//! let service = ClearnodeService::new(config, Arc::new(signer), Stores::in_memory())?;
//! service.start().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod auth;
pub mod dispatcher;
pub mod domain;
pub mod forwarder;
pub mod ports;
pub mod registry;
pub mod responder;
pub mod rpc;
pub mod service;
pub mod ws;

pub use adapters::{
    InMemoryAppSessionStore, InMemoryChannelStore, InMemoryRpcHistoryStore, ManualClock,
};
pub use auth::{AuthError, AuthManager};
pub use dispatcher::{Dispatcher, Stores};
pub use domain::{
    ClearnodeConfig, ConfigError, GatewayError, NetworkConfig, NodeMetrics, RpcError, RpcMethod,
};
pub use forwarder::Forwarder;
pub use ports::{AppSessionStore, ChannelStore, Clock, RpcHistoryStore, RpcRecord, SystemClock};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
pub use responder::{Responder, SignedFrame};
pub use rpc::RpcHandlers;
pub use service::ClearnodeService;

//! # RPC Dispatcher
//!
//! Drives one connection from the first frame to disconnect:
//!
//! ```text
//! handshake ──auth_verify ok──→ register + initial pushes ──→ session loop ──→ unregister
//!    │ parse error                                               │ read error, close,
//!    ↓                                                           ↓ session expiry
//!  close                                                       close
//! ```
//!
//! The dispatcher is transport-agnostic: it reads text frames from any
//! `Stream` and writes through the connection's [`ConnectionHandle`]. The
//! WebSocket adapter in [`crate::ws`] and the in-process tests both plug in
//! here.
//!
//! ## Error policy
//!
//! - Handshake: a malformed frame closes the connection; auth failures are
//!   answered and the client may retry.
//! - Session loop: every failure is answered with a signed error frame and the
//!   connection stays open, except an expired session which closes it.
//! - A frame the node cannot sign is never sent; the failure is logged and
//!   counted.

use crate::adapters::{InMemoryAppSessionStore, InMemoryChannelStore, InMemoryRpcHistoryStore};
use crate::auth::AuthManager;
use crate::domain::config::ClearnodeConfig;
use crate::domain::error::RpcError;
use crate::domain::methods::{self, RpcMethod};
use crate::domain::metrics::NodeMetrics;
use crate::domain::timestamp::validate_timestamp;
use crate::forwarder::Forwarder;
use crate::ports::{AppSessionStore, ChannelStore, Clock, RpcHistoryStore};
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::responder::{Responder, SignedFrame};
use crate::rpc::{wallet_account, Call, RpcHandlers};
use cn_01_signature_verification::{verify, Signer};
use cn_02_ledger::Ledger;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::{Address, Channel, ChannelStatus, RpcData, RpcMessage};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const MSG_INVALID_FORMAT: &str = "Invalid message format";
pub const MSG_AUTH_REQUIRED: &str = "Authentication required. Please send auth_request first.";
pub const MSG_SESSION_EXPIRED: &str = "Session expired. Please re-authenticate.";
pub const MSG_UNSUPPORTED_METHOD: &str = "Unsupported method";

/// Persistence the dispatcher and handlers work against.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Ledger,
    pub sessions: Arc<dyn AppSessionStore>,
    pub channels: Arc<dyn ChannelStore>,
    pub history: Arc<dyn RpcHistoryStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            ledger: Ledger::in_memory(),
            sessions: Arc::new(InMemoryAppSessionStore::new()),
            channels: Arc::new(InMemoryChannelStore::new()),
            history: Arc::new(InMemoryRpcHistoryStore::new()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthVerifyParams {
    challenge: String,
    address: String,
}

pub struct Dispatcher {
    config: Arc<ClearnodeConfig>,
    auth: Arc<AuthManager>,
    registry: Arc<ConnectionRegistry>,
    forwarder: Forwarder,
    handlers: RpcHandlers,
    responder: Responder,
    metrics: Arc<NodeMetrics>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<ClearnodeConfig>,
        signer: Arc<dyn Signer>,
        stores: Stores,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = Arc::new(NodeMetrics::new());
        let registry = Arc::new(ConnectionRegistry::new(config.protocol.write_timeout));
        let auth = Arc::new(AuthManager::new(
            config.auth.challenge_ttl,
            config.auth.session_timeout,
            Arc::clone(&clock),
        ));
        let responder = Responder::new(signer, Arc::clone(&clock));
        let forwarder = Forwarder::new(
            Arc::clone(&stores.sessions),
            Arc::clone(&registry),
            Arc::clone(&metrics),
        );
        let handlers = RpcHandlers::new(
            Arc::clone(&config),
            responder.clone(),
            stores.ledger,
            stores.sessions,
            stores.channels,
            stores.history,
            Arc::clone(&clock),
        );

        Self {
            config,
            auth,
            registry,
            forwarder,
            handlers,
            responder,
            metrics,
            clock,
        }
    }

    pub fn config(&self) -> &ClearnodeConfig {
        &self.config
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    /// The node's own address.
    pub fn node_address(&self) -> Address {
        self.responder.address()
    }

    /// Serve one connection until it closes.
    ///
    /// `inbound` yields the text frames read from the peer; `handle` is the
    /// outbound side. The handle is closed when this returns.
    pub async fn serve_connection<S, E>(&self, mut inbound: S, handle: ConnectionHandle)
    where
        S: Stream<Item = Result<String, E>> + Unpin,
        E: fmt::Display,
    {
        self.metrics.record_connect();
        info!(connection_id = %handle.id(), "Connection opened");

        if let Some(address) = self.handshake(&mut inbound, &handle).await {
            self.registry.register(address, handle.clone());
            info!(address = %address, connection_id = %handle.id(), "Participant authenticated");

            self.push_channels(&address).await;
            self.push_balances(&address).await;
            self.session_loop(&mut inbound, &handle, address).await;

            self.registry.unregister_connection(&address, handle.id());
            info!(address = %address, connection_id = %handle.id(), "Connection closed for participant");
        }

        handle.close();
        self.metrics.record_disconnect();
    }

    // =========================================================================
    // Handshake
    // =========================================================================

    async fn handshake<S, E>(&self, inbound: &mut S, handle: &ConnectionHandle) -> Option<Address>
    where
        S: Stream<Item = Result<String, E>> + Unpin,
        E: fmt::Display,
    {
        loop {
            let raw = next_frame(inbound, handle).await?;
            self.metrics.record_received();

            let msg = match RpcMessage::parse(raw.as_bytes()) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(connection_id = %handle.id(), error = %e, "Invalid handshake frame");
                    self.send_error(handle, None, MSG_INVALID_FORMAT).await;
                    return None;
                }
            };
            let Some(req) = msg.req.as_ref() else {
                self.send_error(handle, None, MSG_AUTH_REQUIRED).await;
                continue;
            };

            match req.method.as_str() {
                methods::AUTH_REQUEST => {
                    self.metrics.record_auth_request();
                    if let Err(e) = self.auth_request(handle, req).await {
                        warn!(connection_id = %handle.id(), error = %e, "Auth initialization failed");
                        self.metrics.record_auth_failure();
                        self.send_error(handle, Some(req.request_id), &e.to_string())
                            .await;
                    }
                }
                methods::AUTH_VERIFY => match self.auth_verify(handle, &msg, req).await {
                    Ok(address) => {
                        self.metrics.record_auth_success();
                        return Some(address);
                    }
                    Err(e) => {
                        warn!(connection_id = %handle.id(), error = %e, "Authentication verification failed");
                        self.metrics.record_auth_failure();
                        self.send_error(handle, Some(req.request_id), &e.to_string())
                            .await;
                    }
                },
                other => {
                    debug!(connection_id = %handle.id(), method = other, "Request before authentication");
                    self.send_error(handle, Some(req.request_id), MSG_AUTH_REQUIRED)
                        .await;
                }
            }
        }
    }

    async fn auth_request(
        &self,
        handle: &ConnectionHandle,
        req: &RpcData,
    ) -> Result<(), RpcError> {
        let claimed = req
            .params
            .first()
            .ok_or_else(|| RpcError::invalid_params("missing parameters"))?
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RpcError::Auth("invalid address".into()))?;

        let token = self.auth.generate_challenge(claimed)?;
        let frame = self.responder.response(
            req.request_id,
            methods::AUTH_CHALLENGE,
            vec![json!({ "challenge_message": token })],
        )?;
        self.deliver(handle, &frame).await;
        Ok(())
    }

    async fn auth_verify(
        &self,
        handle: &ConnectionHandle,
        msg: &RpcMessage,
        req: &RpcData,
    ) -> Result<Address, RpcError> {
        let first = req
            .params
            .first()
            .ok_or_else(|| RpcError::invalid_params("missing parameters"))?;
        let params = AuthVerifyParams::deserialize(first)
            .map_err(|e| RpcError::invalid_params(format!("invalid parameters format: {e}")))?;
        let address: Address = params
            .address
            .trim()
            .parse()
            .map_err(|_| RpcError::Auth(format!("invalid address: {}", params.address)))?;

        let signature = msg
            .sig
            .first()
            .ok_or_else(|| RpcError::Auth("missing signature in request".into()))?;
        let bytes = req
            .canonical_bytes()
            .map_err(|e| RpcError::Protocol(e.to_string()))?;
        if !matches!(verify(&bytes, signature, &address), Ok(true)) {
            return Err(RpcError::Auth("invalid signature".into()));
        }

        self.auth.validate_challenge(&params.challenge, &address)?;

        let frame = self.responder.response(
            req.request_id,
            methods::AUTH_VERIFY,
            vec![json!({ "address": address, "success": true })],
        )?;
        self.deliver(handle, &frame).await;
        Ok(address)
    }

    // =========================================================================
    // Session loop
    // =========================================================================

    async fn session_loop<S, E>(
        &self,
        inbound: &mut S,
        handle: &ConnectionHandle,
        address: Address,
    ) where
        S: Stream<Item = Result<String, E>> + Unpin,
        E: fmt::Display,
    {
        while let Some(raw) = next_frame(inbound, handle).await {
            self.metrics.record_received();

            if !self.auth.validate_session(&address) {
                info!(address = %address, "Session expired");
                self.send_error(handle, None, MSG_SESSION_EXPIRED).await;
                break;
            }
            self.auth.update_session(&address);

            let msg = match RpcMessage::parse(raw.as_bytes()) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(address = %address, error = %e, "Invalid message format");
                    self.send_error(handle, None, MSG_INVALID_FORMAT).await;
                    continue;
                }
            };

            if msg.is_relay() {
                if let Err(e) = self.forwarder.forward(&msg, &raw, &address).await {
                    warn!(address = %address, code = e.code(), error = %e, "Error forwarding message");
                    let request_id = msg.payload().map(|p| p.request_id);
                    self.send_error(handle, request_id, &format!("Failed to forward message: {e}"))
                        .await;
                }
                continue;
            }

            let Some(req) = msg.req.as_ref() else {
                continue;
            };

            if let Err(e) = validate_timestamp(
                req.timestamp,
                self.clock.now_millis(),
                self.config.protocol.msg_expiry,
            ) {
                warn!(address = %address, timestamp = req.timestamp, error = %e, "Rejected stale request");
                self.reject(handle, &address, &msg, req, &e.to_string())
                    .await;
                continue;
            }

            let method = match req.method.parse::<RpcMethod>() {
                Ok(method) => method,
                Err(_) => {
                    debug!(address = %address, method = %req.method, "Unsupported method");
                    self.metrics.record_unsupported();
                    self.reject(handle, &address, &msg, req, MSG_UNSUPPORTED_METHOD)
                        .await;
                    continue;
                }
            };
            self.metrics.record_method(method);
            self.dispatch(handle, address, method, &msg, req).await;
        }
    }

    async fn dispatch(
        &self,
        handle: &ConnectionHandle,
        address: Address,
        method: RpcMethod,
        msg: &RpcMessage,
        req: &RpcData,
    ) {
        let call = Call {
            caller: address,
            request: req,
            signatures: &msg.sig,
        };
        let outcome = match self.handlers.handle(method, &call) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    address = %address,
                    method = %method,
                    code = e.code(),
                    error = %e,
                    "Request failed"
                );
                self.reject(handle, &address, msg, req, &e.to_string())
                    .await;
                return;
            }
        };

        let frame = match self
            .responder
            .response(req.request_id, method.response_name(), outcome.params)
        {
            Ok(frame) => frame,
            Err(e) => {
                self.signing_failed(&e);
                return;
            }
        };
        self.deliver(handle, &frame).await;
        debug!(address = %address, method = %method, request_id = req.request_id, "Request served");

        if method.is_mutating() {
            self.record_history(&address, msg, req, &frame);
            self.push_balances(&address).await;
        }
        if let Some(channel) = outcome.channel_update {
            self.push_channel(&channel).await;
        }
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    async fn deliver(&self, handle: &ConnectionHandle, frame: &SignedFrame) {
        if handle
            .send(frame.text.clone(), self.registry.write_timeout())
            .await
        {
            self.metrics.record_sent();
        }
    }

    async fn send_error(&self, handle: &ConnectionHandle, request_id: Option<u64>, message: &str) {
        match self.responder.error(request_id, message) {
            Ok(frame) => self.deliver(handle, &frame).await,
            Err(e) => self.signing_failed(&e),
        }
    }

    /// Answer a failed request and keep the exchange in the caller's history.
    async fn reject(
        &self,
        handle: &ConnectionHandle,
        address: &Address,
        msg: &RpcMessage,
        req: &RpcData,
        message: &str,
    ) {
        match self.responder.error(Some(req.request_id), message) {
            Ok(frame) => {
                self.record_history(address, msg, req, &frame);
                self.deliver(handle, &frame).await;
            }
            Err(e) => self.signing_failed(&e),
        }
    }

    fn record_history(
        &self,
        address: &Address,
        msg: &RpcMessage,
        req: &RpcData,
        frame: &SignedFrame,
    ) {
        if let Err(e) = self.handlers.history().store_message(
            address,
            req,
            &msg.sig,
            &frame.payload,
            &frame.signatures,
        ) {
            error!(address = %address, method = %req.method, error = %e, "Failed to store RPC message");
        }
    }

    /// Signed unsolicited frame to whatever connection `address` has.
    async fn push(&self, address: &Address, method: &str, params: Vec<Value>) {
        match self.responder.push(method, params) {
            Ok(frame) => {
                if self.registry.send(address, frame.text).await {
                    self.metrics.record_sent();
                }
            }
            Err(e) => self.signing_failed(&e),
        }
    }

    async fn push_balances(&self, address: &Address) {
        let balances = self
            .handlers
            .ledger()
            .participant(*address)
            .balances(&wallet_account(address));
        match balances {
            Ok(balances) => {
                self.push(address, methods::PUSH_BALANCES, vec![json!(balances)])
                    .await
            }
            Err(e) => error!(address = %address, error = %e, "Failed to load balances"),
        }
    }

    async fn push_channels(&self, address: &Address) {
        let channels = self
            .handlers
            .channels()
            .channels_for_participant(address, Some(ChannelStatus::Open));
        match channels {
            Ok(channels) => {
                self.push(address, methods::PUSH_CHANNELS, vec![json!(channels)])
                    .await
            }
            Err(e) => error!(address = %address, error = %e, "Failed to load channels"),
        }
    }

    async fn push_channel(&self, channel: &Channel) {
        self.push(&channel.participant, methods::PUSH_CHANNEL, vec![json!(channel)])
            .await
    }

    fn signing_failed(&self, e: &RpcError) {
        error!(error = %e, "Failed to sign outbound frame, nothing sent");
        self.metrics.record_signing_failure();
    }

    /// Drop expired challenges and idle sessions.
    pub fn purge_expired(&self) -> usize {
        self.auth.purge_expired()
    }
}

/// Next text frame, or `None` once the peer is gone or the handle was closed.
async fn next_frame<S, E>(inbound: &mut S, handle: &ConnectionHandle) -> Option<String>
where
    S: Stream<Item = Result<String, E>> + Unpin,
    E: fmt::Display,
{
    tokio::select! {
        biased;
        _ = handle.closed() => {
            debug!(connection_id = %handle.id(), "Connection closed by node");
            None
        }
        frame = inbound.next() => match frame {
            Some(Ok(text)) => Some(text),
            Some(Err(e)) => {
                debug!(connection_id = %handle.id(), error = %e, "Error reading message");
                None
            }
            None => None,
        },
    }
}

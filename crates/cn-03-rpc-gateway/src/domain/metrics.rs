//! Node metrics.
//!
//! Plain atomic counters, exported as JSON on `/metrics`. Recording never
//! blocks and never fails.

use super::methods::RpcMethod;
use std::sync::atomic::{AtomicU64, Ordering};

/// Clearnode metrics
#[derive(Default)]
pub struct NodeMetrics {
    // Connection counters
    pub connections_total: AtomicU64,
    pub connected_clients: AtomicU64,

    // Message counters
    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,

    // Authentication counters
    pub auth_requests: AtomicU64,
    pub auth_success: AtomicU64,
    pub auth_failure: AtomicU64,

    pub signing_failures: AtomicU64,

    // Per-method request counters, indexed by `RpcMethod::index`
    method_requests: [AtomicU64; RpcMethod::COUNT],
    pub unsupported_requests: AtomicU64,
}

impl NodeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted socket
    pub fn record_connect(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connected_clients.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a closed socket
    pub fn record_disconnect(&self) {
        // Never wraps below zero
        let _ = self
            .connected_clients
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auth_request(&self) {
        self.auth_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auth_success(&self) {
        self.auth_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auth_failure(&self) {
        self.auth_failure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_signing_failure(&self) {
        self.signing_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_method(&self, method: RpcMethod) {
        self.method_requests[method.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unsupported(&self) {
        self.unsupported_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn method_count(&self, method: RpcMethod) -> u64 {
        self.method_requests[method.index()].load(Ordering::Relaxed)
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        let methods: serde_json::Map<String, serde_json::Value> = RpcMethod::ALL
            .iter()
            .map(|m| (m.as_str().to_string(), self.method_count(*m).into()))
            .collect();

        serde_json::json!({
            "connections": {
                "total": self.connections_total.load(Ordering::Relaxed),
                "connected": self.connected_clients.load(Ordering::Relaxed),
            },
            "messages": {
                "received": self.messages_received.load(Ordering::Relaxed),
                "sent": self.messages_sent.load(Ordering::Relaxed),
            },
            "auth": {
                "requests": self.auth_requests.load(Ordering::Relaxed),
                "success": self.auth_success.load(Ordering::Relaxed),
                "failure": self.auth_failure.load(Ordering::Relaxed),
            },
            "signing_failures": self.signing_failures.load(Ordering::Relaxed),
            "rpc_requests": methods,
            "unsupported_requests": self.unsupported_requests.load(Ordering::Relaxed),
        })
    }
}

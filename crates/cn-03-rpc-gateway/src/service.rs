//! # Clearnode Service
//!
//! Owns the [`Dispatcher`], serves the WebSocket endpoint plus `/health` and
//! `/metrics` over axum, and runs the periodic auth-state cleanup.

use crate::dispatcher::{Dispatcher, Stores};
use crate::domain::config::ClearnodeConfig;
use crate::domain::error::GatewayError;
use crate::ports::{Clock, SystemClock};
use crate::ws;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use cn_01_signature_verification::Signer;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct ClearnodeService {
    dispatcher: Arc<Dispatcher>,
    shutdown: Arc<Notify>,
}

impl ClearnodeService {
    pub fn new(
        config: ClearnodeConfig,
        signer: Arc<dyn Signer>,
        stores: Stores,
    ) -> Result<Self, GatewayError> {
        Self::with_clock(config, signer, stores, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: ClearnodeConfig,
        signer: Arc<dyn Signer>,
        stores: Stores,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let dispatcher = Arc::new(Dispatcher::new(Arc::new(config), signer, stores, clock));
        Ok(Self {
            dispatcher,
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// HTTP routes: the WebSocket upgrade path, `/health` and `/metrics`.
    pub fn router(&self) -> Router {
        let ws_path = self.dispatcher.config().server.ws_path.clone();
        Router::new()
            .route(&ws_path, get(ws_upgrade))
            .route("/health", get(health_check))
            .route("/metrics", get(metrics))
            .with_state(Arc::clone(&self.dispatcher))
    }

    /// Bind the configured address and serve until [`shutdown`](Self::shutdown).
    pub async fn start(&self) -> Result<(), GatewayError> {
        let addr = self.dispatcher.config().bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{addr}: {e}")))?;

        let shutdown = Arc::clone(&self.shutdown);
        self.serve(listener, async move { shutdown.notified().await })
            .await
    }

    /// Serve on an already bound listener until `signal` resolves. Open
    /// connections are closed once it does.
    pub async fn serve<F>(&self, listener: TcpListener, signal: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener
            .local_addr()
            .map_err(|e| GatewayError::Bind(e.to_string()))?;
        info!(
            addr = %local,
            ws_path = %self.dispatcher.config().server.ws_path,
            node = %self.dispatcher.node_address(),
            "Clearnode listening"
        );

        let cleanup = self.spawn_cleanup();
        let registry = Arc::clone(self.dispatcher.registry());

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                signal.await;
                info!("Shutdown requested, closing connections");
                registry.close_all();
            })
            .await
            .map_err(|e| GatewayError::Serve(e.to_string()));

        cleanup.abort();
        info!("Clearnode stopped");
        result
    }

    /// Stop a server started with [`start`](Self::start).
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
        self.dispatcher.registry().close_all();
    }

    fn spawn_cleanup(&self) -> JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let every = dispatcher.config().auth.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = dispatcher.purge_expired();
                if purged > 0 {
                    debug!(purged, "Purged expired auth state");
                }
            }
        })
    }
}

async fn ws_upgrade(
    State(dispatcher): State<Arc<Dispatcher>>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    let max = dispatcher.config().protocol.max_message_size;
    upgrade
        .max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| ws::handle_socket(socket, dispatcher))
}

async fn health_check(State(dispatcher): State<Arc<Dispatcher>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "clearnode",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": dispatcher.registry().len(),
    }))
}

async fn metrics(State(dispatcher): State<Arc<Dispatcher>>) -> Json<serde_json::Value> {
    Json(dispatcher.metrics().to_json())
}

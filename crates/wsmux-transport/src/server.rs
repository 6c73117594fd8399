//! WebSocket transport server using Axum.
//!
//! Validates upgrade requests, hands upgraded sockets to the connection
//! handler, and owns the link registry for the server's lifetime.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::rejection::WebSocketUpgradeRejection,
    },
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use crate::bufferpool::BufferPool;
use crate::config::TransportConfig;
use crate::connection::handle_ws_connection;
use crate::contracts::{AuthValidator, EventBus, IncomingRequest, LinkRouter};
use crate::error::{SetupError, TransportError};
use crate::registry::LinkRegistry;

/// Query parameter carrying the client's stable id.
pub const STABLE_ID_PARAM: &str = "stableid";

/// How long `stop` waits for live connections to tear down.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Collaborators a server is started with.
#[derive(Clone)]
pub struct TransportDeps {
    pub router: Arc<dyn LinkRouter>,
    pub auth: Arc<dyn AuthValidator>,
    pub event_bus: Arc<dyn EventBus>,
}

/// Shared state for the transport server.
pub(crate) struct AppState {
    pub(crate) config: TransportConfig,
    pub(crate) registry: Arc<LinkRegistry>,
    pub(crate) auth: Arc<dyn AuthValidator>,
    pub(crate) event_bus: Arc<dyn EventBus>,
    pub(crate) pool: Arc<BufferPool>,
    /// Connected client count (for health check)
    pub(crate) client_count: Arc<AtomicUsize>,
    /// Parent of every connection's `done` token
    pub(crate) shutdown: CancellationToken,
}

/// Accepts websocket upgrades and runs connections.
pub struct TransportServer {
    registry: Arc<LinkRegistry>,
    client_count: Arc<AtomicUsize>,
    /// Cancelled on stop to end live connections
    connections: CancellationToken,
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl TransportServer {
    /// Bind and start serving. The link registry is created here and lives
    /// as long as the server.
    pub async fn start(config: TransportConfig, deps: TransportDeps) -> Result<Self, TransportError> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let registry = Arc::new(LinkRegistry::new(deps.router));
        let client_count = Arc::new(AtomicUsize::new(0));
        let connections = CancellationToken::new();

        let addr = format!("{}:{}", config.hostname, config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind { addr: addr.clone(), source })?;
        let actual_port = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr: addr.clone(), source })?
            .port();

        info!("wsmux transport listening on ws://{}:{}/ws", config.hostname, actual_port);

        let state = Arc::new(AppState {
            config,
            registry: registry.clone(),
            auth: deps.auth,
            event_bus: deps.event_bus,
            pool: Arc::new(BufferPool::new()),
            client_count: client_count.clone(),
            shutdown: connections.clone(),
        });

        let app = Router::new()
            .route("/ws", get(ws_upgrade_handler))
            .route("/health", get(health_handler))
            .with_state(state);

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await;
            if let Err(e) = served {
                warn!("transport server error: {e}");
            }
        });

        Ok(Self {
            registry,
            client_count,
            connections,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn registry(&self) -> &Arc<LinkRegistry> {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.client_count.load(Ordering::Relaxed)
    }

    /// Gracefully stop the server: close the listener, end every live
    /// connection, and wait for their teardown to clear the registry.
    pub async fn stop(&mut self) {
        self.connections.cancel();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }

        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while self.connection_count() > 0 {
            if Instant::now() >= deadline {
                warn!(remaining = self.connection_count(), "connections still open after shutdown");
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        info!("wsmux transport server stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let stable_id = match check_upgrade_request(&state, &headers, &params) {
        Ok(stable_id) => stable_id,
        Err(e) => {
            warn!(error = %e, "rejecting websocket request");
            return e.into_response();
        }
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let span = info_span!("ws", stable_id = %stable_id);
    ws.max_message_size(state.config.max_message_size)
        .on_failed_upgrade(|e| warn!("websocket upgrade failed: {e}"))
        .on_upgrade(move |socket| handle_ws_connection(socket, stable_id, state).instrument(span))
        .into_response()
}

/// Pre-upgrade checks: stable id present, then auth.
fn check_upgrade_request(
    state: &AppState,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) -> Result<String, SetupError> {
    let stable_id = params
        .get(STABLE_ID_PARAM)
        .filter(|id| !id.is_empty())
        .cloned()
        .ok_or(SetupError::MissingStableId)?;
    state
        .auth
        .validate_incoming_request(&IncomingRequest::new(headers, params))?;
    Ok(stable_id)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "connections": state.client_count.load(Ordering::Relaxed),
        "links": state.registry.len(),
    }))
}
